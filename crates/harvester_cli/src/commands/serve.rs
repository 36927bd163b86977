use std::sync::Arc;

use harvester::server::{self, AppState, RunController};
use harvester::upstream::UpstreamClient;
use harvester::{Harvester, Shutdown};

use super::shared::open_database;
use crate::ServeArgs;
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Run the trigger/status service until Ctrl+C.
pub(crate) async fn handle_serve(
    args: ServeArgs,
    config: &Config,
    database_url: &str,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = match args.bind {
        Some(bind) => bind,
        None => config.bind_addr()?,
    };

    let db = Arc::new(open_database(database_url).await?);
    let client = UpstreamClient::new(&config.upstream_config())?;

    // Background runs have no terminal to draw on.
    let reporter = Arc::new(ProgressReporter::logging());
    let harvester = Harvester::new(client, Arc::clone(&db), config.harvest_options())
        .with_progress(reporter.as_callback());

    let state = AppState {
        controller: Arc::new(RunController::new(harvester)),
        db,
        export_dir: config.export.dir.clone(),
    };

    server::serve(addr, state, shutdown).await?;
    Ok(())
}

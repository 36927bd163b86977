use std::sync::Arc;

use harvester::upstream::UpstreamClient;
use harvester::{HarvestError, Harvester, Shutdown};

use super::shared::{display_report, open_database};
use crate::RunArgs;
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Run one harvest in the foreground.
pub(crate) async fn handle_run(
    args: RunArgs,
    config: &Config,
    database_url: &str,
    shutdown: Shutdown,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut options = config.harvest_options();
    if let Some(workers) = args.workers {
        options.detail.workers = workers;
    }
    if let Some(rate) = args.rate {
        options.detail.rate_per_second = rate;
    }
    if let Some(page_workers) = args.page_workers {
        options.discovery.workers = page_workers;
    }

    let db = Arc::new(open_database(database_url).await?);
    let client = UpstreamClient::new(&config.upstream_config())?;

    let reporter = Arc::new(ProgressReporter::new());
    let harvester = Harvester::new(client, db, options).with_progress(reporter.as_callback());

    let result = harvester.run(&shutdown).await;
    reporter.finish();

    match result {
        Ok(report) => {
            display_report(&report);
            Ok(())
        }
        Err(HarvestError::Cancelled) => {
            eprintln!("Cancelled before any repositories were fetched.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

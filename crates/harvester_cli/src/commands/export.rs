use std::path::PathBuf;

use chrono::Local;
use harvester::export::export_dataset;

use super::shared::open_database;
use crate::config::Config;

pub(crate) async fn handle_export(
    output: Option<PathBuf>,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = output.unwrap_or_else(|| config.export.dir.clone());
    let db = open_database(database_url).await?;

    let paths = export_dataset(&db, &dir, Local::now().naive_local()).await?;
    println!("Exported {} repositories:", paths.rows);
    println!("  {}", paths.csv.display());
    println!("  {}", paths.xlsx.display());
    Ok(())
}

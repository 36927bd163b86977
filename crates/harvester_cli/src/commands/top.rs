use harvester::harvest::{TopEntry, format_top};
use harvester::repository;

use super::shared::open_database;
use crate::config::Config;

/// Print the most-starred stored repositories.
pub(crate) async fn handle_top(
    limit: Option<usize>,
    config: &Config,
    database_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let limit = limit.unwrap_or(config.report.top_n);
    let db = open_database(database_url).await?;

    let stored = repository::count(&db).await?;
    let entries: Vec<TopEntry> = repository::top_by_stars(&db, limit as u64)
        .await?
        .into_iter()
        .map(|m| TopEntry {
            full_name: m.full_name,
            stars_count: m.stars_count,
        })
        .collect();

    if entries.is_empty() {
        println!("No repositories stored yet.");
        return Ok(());
    }

    println!("{stored} repositories stored. Top {}:", entries.len());
    for line in format_top(&entries) {
        println!("  {line}");
    }
    Ok(())
}

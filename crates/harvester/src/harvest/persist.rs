//! Hand the accumulated records to the store.

use std::time::Instant;

use chrono::Utc;
use sea_orm::DatabaseConnection;

use crate::entity::repository::ActiveModel;
use crate::repository::{self, RepositoryError};
use crate::retry::RetryConfig;
use crate::upstream::RepositoryRecord;

use super::progress::{HarvestProgress, ProgressCallback, emit};

/// Upsert `records` in chunks of `chunk_size`, stamping each row with the
/// current time. Returns the number of rows written.
///
/// # Errors
/// Propagates the store error once transient retries are exhausted.
pub async fn persist(
    db: &DatabaseConnection,
    records: &[RepositoryRecord],
    chunk_size: usize,
    retry: RetryConfig,
    on_progress: Option<&ProgressCallback>,
) -> Result<u64, RepositoryError> {
    if records.is_empty() {
        tracing::info!("No repositories to save");
        return Ok(0);
    }

    let started = Instant::now();
    emit(
        on_progress,
        HarvestProgress::PersistStarted {
            count: records.len(),
        },
    );

    let synced_at = Utc::now().fixed_offset();
    let models: Vec<ActiveModel> = records
        .iter()
        .map(|r| ActiveModel::from_record(r, synced_at))
        .collect();

    let saved = repository::bulk_upsert_with_retry(db, models, chunk_size, retry).await?;
    let elapsed = started.elapsed();
    tracing::info!(saved, elapsed_ms = elapsed.as_millis() as u64, "Repositories saved");
    emit(on_progress, HarvestProgress::PersistComplete { saved, elapsed });

    Ok(saved)
}

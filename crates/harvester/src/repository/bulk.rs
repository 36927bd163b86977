use std::time::Duration;

use backon::Retryable;
use sea_orm::{
    DatabaseConnection, EntityTrait, TransactionTrait,
    sea_query::OnConflict,
};

use crate::entity::repository::{ActiveModel, Column, Entity as Repository};
use crate::retry::{AttemptCounter, RetryConfig};

use super::errors::{RepositoryError, Result};

// ─── Bulk Operations ─────────────────────────────────────────────────────────

/// Default number of rows per INSERT statement.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default retry policy for bulk writes: 3 retries from 100ms, capped at 5s.
#[must_use]
pub fn default_write_retry() -> RetryConfig {
    RetryConfig::new(Duration::from_millis(100), Duration::from_secs(5), 3)
}

/// Build the ON CONFLICT clause used by bulk upsert.
///
/// The upstream id is the only key. Every other column is overwritten so the
/// stored row always mirrors the latest fetch.
pub(crate) fn build_upsert_on_conflict() -> OnConflict {
    OnConflict::column(Column::Id)
        .update_columns([
            Column::FullName,
            Column::CreatedAt,
            Column::UpdatedAt,
            Column::Archived,
            Column::StarsCount,
            Column::Size,
            Column::ReleaseCounter,
            Column::TagCount,
            Column::SyncedAt,
        ])
        .to_owned()
}

/// Upsert `models` keyed by id, `chunk_size` rows per statement.
///
/// All chunks run inside one transaction: either every row is written or the
/// store is left untouched. Returns the number of rows submitted.
///
/// # Errors
/// `InvalidInput` for a zero chunk size, `Database` for any statement failure.
pub async fn bulk_upsert(
    db: &DatabaseConnection,
    models: Vec<ActiveModel>,
    chunk_size: usize,
) -> Result<u64> {
    if models.is_empty() {
        return Ok(0);
    }
    if chunk_size == 0 {
        return Err(RepositoryError::InvalidInput {
            message: "chunk size must be positive".to_string(),
        });
    }

    let txn = db.begin().await?;
    for chunk in models.chunks(chunk_size) {
        Repository::insert_many(chunk.to_vec())
            .on_conflict(build_upsert_on_conflict())
            .exec_without_returning(&txn)
            .await?;
    }
    txn.commit().await?;

    Ok(models.len() as u64)
}

/// [`bulk_upsert`] with retries for transient failures (lock contention,
/// dropped connections).
pub async fn bulk_upsert_with_retry(
    db: &DatabaseConnection,
    models: Vec<ActiveModel>,
    chunk_size: usize,
    retry: RetryConfig,
) -> Result<u64> {
    if models.is_empty() {
        return Ok(0);
    }

    tracing::debug!(count = models.len(), chunk_size, "Starting bulk upsert");
    let attempts = AttemptCounter::default();

    let op = || {
        attempts.bump();
        bulk_upsert(db, models.clone(), chunk_size)
    };

    op.retry(retry.into_backoff())
        .notify(|err: &RepositoryError, dur: Duration| {
            tracing::warn!(
                attempt = attempts.get(),
                backoff_ms = dur.as_millis() as u64,
                error = %err,
                "Bulk upsert failed, retrying..."
            );
        })
        .when(RepositoryError::is_transient)
        .await
}

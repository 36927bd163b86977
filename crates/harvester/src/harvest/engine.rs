//! Orchestration of one harvest run: discovery, details, persistence,
//! summary.

use std::sync::Arc;
use std::time::Instant;

use sea_orm::DatabaseConnection;

use crate::shutdown::Shutdown;
use crate::upstream::UpstreamClient;

use super::accumulator::Accumulator;
use super::detail::fetch_details;
use super::discovery::discover;
use super::persist::persist;
use super::progress::{ProgressCallback, SharedProgress};
use super::report::format_top;
use super::types::{HarvestError, HarvestOptions, HarvestReport};

/// Runs harvests against one upstream and one store.
///
/// Each call to [`Harvester::run`] starts from an empty accumulator, so a
/// single `Harvester` can be reused for repeated runs.
#[derive(Clone)]
pub struct Harvester {
    client: UpstreamClient,
    db: Arc<DatabaseConnection>,
    options: HarvestOptions,
    on_progress: Option<SharedProgress>,
}

impl Harvester {
    pub fn new(client: UpstreamClient, db: Arc<DatabaseConnection>, options: HarvestOptions) -> Self {
        Self {
            client,
            db,
            options,
            on_progress: None,
        }
    }

    /// Attach a progress callback. Called from worker tasks, so it must be
    /// cheap and thread-safe.
    #[must_use]
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn options(&self) -> &HarvestOptions {
        &self.options
    }

    /// Execute one full run.
    ///
    /// Cancellation during discovery aborts the run with
    /// [`HarvestError::Cancelled`]. Cancellation during the detail stage
    /// keeps what was already fetched: it is saved and the report comes back
    /// with `cancelled` set.
    ///
    /// # Errors
    /// See [`HarvestError`].
    pub async fn run(&self, shutdown: &Shutdown) -> Result<HarvestReport, HarvestError> {
        let started = Instant::now();
        let options = &self.options;
        tracing::info!("Harvest started");

        let discovered = discover(
            &self.client,
            &options.discovery,
            options.progress_interval,
            shutdown,
            self.on_progress.clone(),
        )
        .await?;
        let discovered_count = discovered.names.len();

        let accumulator = Arc::new(Accumulator::new());
        let detail = fetch_details(
            &self.client,
            discovered.names,
            &options.detail,
            Arc::clone(&accumulator),
            options.progress_interval,
            shutdown,
            self.on_progress.clone(),
        )
        .await;

        let records = accumulator.snapshot();
        let saved = persist(
            &self.db,
            &records,
            options.write_chunk_size,
            options.write_retry.clone(),
            self.on_progress.as_deref(),
        )
        .await?;

        let top = accumulator.top_by_stars(options.top_n);
        for line in format_top(&top) {
            tracing::info!("{line}");
        }

        let report = HarvestReport {
            total: discovered.total,
            discovered: discovered_count,
            failed_pages: discovered.failed_pages,
            fetched: records.len(),
            failed_details: detail.failed,
            saved,
            top,
            elapsed: started.elapsed(),
            cancelled: detail.cancelled,
        };
        tracing::info!(
            total = report.total,
            discovered = report.discovered,
            fetched = report.fetched,
            saved = report.saved,
            failed_pages = report.failed_pages.len(),
            failed_details = report.failed_details,
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Harvest finished"
        );
        Ok(report)
    }
}

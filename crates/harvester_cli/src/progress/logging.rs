use harvester::harvest::HarvestProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: HarvestProgress) {
        match event {
            HarvestProgress::DiscoveryStarted => {
                tracing::info!("Resolving search index size");
            }

            HarvestProgress::TotalResolved {
                total,
                pages,
                page_size,
            } => {
                tracing::info!(total, pages, page_size, "Discovering repositories");
            }

            HarvestProgress::DiscoveryTick { collected, total } => {
                tracing::info!(collected, total, "Discovery progress");
            }

            HarvestProgress::PageFailed {
                page,
                error,
                final_attempt,
            } => {
                if final_attempt {
                    tracing::error!(page, error = %error, "Page dropped");
                } else {
                    tracing::warn!(page, error = %error, "Page failed, will retry");
                }
            }

            HarvestProgress::RetryPassStarted { pages } => {
                tracing::info!(pages, "Retrying failed pages");
            }

            HarvestProgress::DiscoveryComplete {
                names,
                failed_pages,
            } => {
                tracing::info!(names, failed_pages, "Discovery complete");
            }

            HarvestProgress::DetailStarted {
                jobs,
                workers,
                rate_per_second,
            } => {
                tracing::info!(jobs, workers, rate_per_second, "Fetching details");
            }

            HarvestProgress::DetailTick { fetched, total } => {
                tracing::info!(fetched, total, "Detail progress");
            }

            HarvestProgress::DetailFailed { full_name, error } => {
                tracing::warn!(repo = %full_name, error = %error, "Failed to fetch repository");
            }

            HarvestProgress::DetailComplete {
                fetched,
                failed,
                elapsed,
            } => {
                tracing::info!(
                    fetched,
                    failed,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Details complete"
                );
            }

            HarvestProgress::PersistStarted { count } => {
                tracing::info!(count, "Saving to database");
            }

            HarvestProgress::PersistComplete { saved, elapsed } => {
                tracing::info!(saved, elapsed_ms = elapsed.as_millis() as u64, "Saved");
            }

            HarvestProgress::RateLimitBackoff {
                target,
                retry_after_ms,
                attempt,
            } => {
                tracing::debug!(
                    request = %target,
                    retry_after_ms,
                    attempt,
                    "Backing off"
                );
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}

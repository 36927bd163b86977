//! Progress reporting types for harvest runs.
//!
//! Events are delivered synchronously from worker tasks, so callbacks must be
//! cheap and must not block.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Stage of the pipeline a periodic tick belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Detail,
}

/// Progress events emitted during a harvest run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum HarvestProgress {
    /// Requesting the total item count from the search index.
    DiscoveryStarted,

    /// The index reported its size.
    TotalResolved {
        /// Total repositories according to the index.
        total: u64,
        /// Number of pages that will be requested.
        pages: u32,
        /// Page size used for the listing.
        page_size: u32,
    },

    /// Periodic discovery heartbeat.
    DiscoveryTick {
        /// Names collected so far.
        collected: usize,
        /// Total repositories according to the index.
        total: u64,
    },

    /// A page exhausted its retries.
    PageFailed {
        /// Page number (1-indexed).
        page: u32,
        /// Short error description.
        error: String,
        /// Whether this failure came from the final sequential pass.
        final_attempt: bool,
    },

    /// Starting the sequential pass over failed pages.
    RetryPassStarted {
        /// Pages queued for another attempt.
        pages: usize,
    },

    /// Discovery finished.
    DiscoveryComplete {
        /// Names collected, duplicates included.
        names: usize,
        /// Pages that failed both passes.
        failed_pages: usize,
    },

    /// Starting the detail worker pool.
    DetailStarted {
        /// Jobs queued.
        jobs: usize,
        /// Worker count.
        workers: usize,
        /// Token rate shared by the workers.
        rate_per_second: u32,
    },

    /// Periodic detail heartbeat.
    DetailTick {
        /// Distinct records accumulated.
        fetched: usize,
        /// Jobs queued for the stage.
        total: usize,
    },

    /// A single repository could not be fetched.
    DetailFailed {
        /// Repository full name.
        full_name: String,
        /// Short error description.
        error: String,
    },

    /// All detail workers have exited.
    DetailComplete {
        /// Distinct records accumulated.
        fetched: usize,
        /// Jobs that failed.
        failed: usize,
        /// Wall time spent in the stage.
        elapsed: Duration,
    },

    /// Writing the accumulated records to storage.
    PersistStarted {
        /// Records in the snapshot.
        count: usize,
    },

    /// Storage write finished.
    PersistComplete {
        /// Rows upserted.
        saved: u64,
        /// Wall time spent writing.
        elapsed: Duration,
    },

    /// An upstream request is backing off before its next attempt.
    RateLimitBackoff {
        /// What was being fetched (a page label or a repository name).
        target: String,
        /// Time to wait before retry (ms).
        retry_after_ms: u64,
        /// Attempt that just failed (1-indexed).
        attempt: u32,
    },
}

impl HarvestProgress {
    /// Stage-specific heartbeat for `stage`.
    #[must_use]
    pub fn tick(stage: Stage, done: usize, total: u64) -> Self {
        match stage {
            Stage::Discovery => HarvestProgress::DiscoveryTick {
                collected: done,
                total,
            },
            Stage::Detail => HarvestProgress::DetailTick {
                fetched: done,
                total: usize::try_from(total).unwrap_or(usize::MAX),
            },
        }
    }
}

/// Callback for progress updates during a run.
pub type ProgressCallback = Box<dyn Fn(HarvestProgress) + Send + Sync>;

/// A callback that can be handed to spawned workers.
pub type SharedProgress = Arc<ProgressCallback>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: HarvestProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

/// Emits a stage heartbeat every period until dropped.
pub(crate) struct ProgressTicker {
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    /// Start ticking. Returns `None` when there is no callback or the period
    /// is zero. The first tick fires one full period after start.
    pub(crate) fn spawn<F>(
        period: Duration,
        stage: Stage,
        total: u64,
        done: F,
        on_progress: Option<SharedProgress>,
    ) -> Option<Self>
    where
        F: Fn() -> usize + Send + 'static,
    {
        let callback = on_progress?;
        if period.is_zero() {
            return None;
        }

        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticks = tokio::time::interval_at(start, period);
            loop {
                ticks.tick().await;
                callback(HarvestProgress::tick(stage, done(), total));
            }
        });
        Some(Self { handle })
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn emit_invokes_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let callback: ProgressCallback = Box::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        emit(Some(&callback), HarvestProgress::DiscoveryStarted);
        emit(
            Some(&callback),
            HarvestProgress::DiscoveryComplete {
                names: 10,
                failed_pages: 0,
            },
        );

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn emit_without_callback_is_a_no_op() {
        emit(None, HarvestProgress::DiscoveryStarted);
    }

    #[test]
    fn tick_selects_variant_by_stage() {
        assert!(matches!(
            HarvestProgress::tick(Stage::Discovery, 5, 10),
            HarvestProgress::DiscoveryTick {
                collected: 5,
                total: 10
            }
        ));
        assert!(matches!(
            HarvestProgress::tick(Stage::Detail, 3, 7),
            HarvestProgress::DetailTick {
                fetched: 3,
                total: 7
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_fires_each_period_until_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = Arc::clone(&count);
        let boxed: ProgressCallback = Box::new(move |event| {
            if matches!(event, HarvestProgress::DetailTick { fetched: 7, total: 9 }) {
                sink.fetch_add(1, Ordering::SeqCst);
            }
        });
        let callback: SharedProgress = Arc::new(boxed);

        let ticker = ProgressTicker::spawn(
            Duration::from_secs(30),
            Stage::Detail,
            9,
            || 7,
            Some(callback),
        )
        .expect("ticker");

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        drop(ticker);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn ticker_is_skipped_without_callback() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        rt.block_on(async {
            assert!(
                ProgressTicker::spawn(Duration::from_secs(1), Stage::Discovery, 0, || 0, None)
                    .is_none()
            );
        });
    }
}

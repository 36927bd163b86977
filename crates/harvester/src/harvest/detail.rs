//! Detail stage: fetch the full record for every discovered name.
//!
//! All workers draw from one closed job queue and share one rate limiter, so
//! the request rate across the pool never exceeds the configured rate no
//! matter how many workers run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::rate_limit::RateLimiter;
use crate::shutdown::Shutdown;
use crate::upstream::{UpstreamClient, UpstreamError};

use super::accumulator::Accumulator;
use super::progress::{HarvestProgress, ProgressTicker, SharedProgress, Stage, emit};
use super::types::DetailOptions;

/// Counters for one detail stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetailOutcome {
    /// Jobs queued.
    pub jobs: usize,
    /// Jobs that failed after all retries.
    pub failed: usize,
    /// Whether the stage stopped early on shutdown.
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Fetch every name in `names` into `accumulator`.
///
/// Failures of individual repositories are logged, reported through
/// `on_progress` and counted; they never abort the stage. On shutdown the
/// workers stop taking jobs and whatever was accumulated stays in place.
pub async fn fetch_details(
    client: &UpstreamClient,
    names: Vec<String>,
    options: &DetailOptions,
    accumulator: Arc<Accumulator>,
    progress_interval: Duration,
    shutdown: &Shutdown,
    on_progress: Option<SharedProgress>,
) -> DetailOutcome {
    let started = Instant::now();
    let jobs = names.len();
    if jobs == 0 {
        return DetailOutcome::default();
    }

    let workers = options.workers.clamp(1, jobs);
    let rate = options.rate_per_second.max(1);
    tracing::info!(jobs, workers, rate_per_second = rate, "Fetching repository details");
    emit(
        on_progress.as_deref(),
        HarvestProgress::DetailStarted {
            jobs,
            workers,
            rate_per_second: rate,
        },
    );

    let (job_tx, job_rx) = mpsc::channel::<String>(jobs);
    for name in names {
        if job_tx.try_send(name).is_err() {
            break;
        }
    }
    drop(job_tx);
    let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));

    let limiter = Arc::new(RateLimiter::start(rate));
    let failed = Arc::new(AtomicUsize::new(0));
    // Set only when a worker abandons a job, not when shutdown fires after
    // the queue has drained.
    let interrupted = Arc::new(AtomicBool::new(false));

    let _ticker = ProgressTicker::spawn(
        progress_interval,
        Stage::Detail,
        jobs as u64,
        {
            let accumulator = Arc::clone(&accumulator);
            move || accumulator.len()
        },
        on_progress.clone(),
    );

    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let client = client.clone();
        let job_rx = Arc::clone(&job_rx);
        let limiter = Arc::clone(&limiter);
        let accumulator = Arc::clone(&accumulator);
        let failed = Arc::clone(&failed);
        let interrupted = Arc::clone(&interrupted);
        let shutdown = shutdown.clone();
        let on_progress = on_progress.clone();
        let policy = options.retry.clone();

        handles.push(tokio::spawn(async move {
            loop {
                let Some(full_name) = job_rx.lock().await.recv().await else {
                    break;
                };
                if limiter.acquire(&shutdown).await.is_none() {
                    interrupted.store(true, Ordering::Relaxed);
                    break;
                }

                match client
                    .fetch_repository(&full_name, &policy, &shutdown, on_progress.as_deref())
                    .await
                {
                    Ok(record) => {
                        accumulator.put(record);
                    }
                    Err(UpstreamError::Cancelled) => {
                        interrupted.store(true, Ordering::Relaxed);
                        break;
                    }
                    Err(e) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(repository = %full_name, error = %e, "Repository fetch failed");
                        emit(
                            on_progress.as_deref(),
                            HarvestProgress::DetailFailed {
                                full_name,
                                error: e.short_message(),
                            },
                        );
                    }
                }
            }
        }));
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Detail worker panicked");
        }
    }

    let outcome = DetailOutcome {
        jobs,
        failed: failed.load(Ordering::Relaxed),
        cancelled: interrupted.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    };
    tracing::info!(
        fetched = accumulator.len(),
        failed = outcome.failed,
        cancelled = outcome.cancelled,
        elapsed_ms = outcome.elapsed.as_millis() as u64,
        "Detail stage complete"
    );
    emit(
        on_progress.as_deref(),
        HarvestProgress::DetailComplete {
            fetched: accumulator.len(),
            failed: outcome.failed,
            elapsed: outcome.elapsed,
        },
    );
    outcome
}

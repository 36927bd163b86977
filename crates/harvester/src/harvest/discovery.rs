//! Page discovery: turn the search index into a list of repository names.
//!
//! The total count fixes the number of pages up front. Pages are drained by
//! a fixed worker pool; pages that exhaust their retries go onto a retry
//! queue and get exactly one more sequential attempt once the pool is done.
//! Pages that fail both passes are dropped and reported.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::shutdown::Shutdown;
use crate::upstream::{UpstreamClient, UpstreamError};

use super::progress::{HarvestProgress, ProgressTicker, SharedProgress, Stage, emit};
use super::types::{DiscoveryOptions, HarvestError};

/// Names collected by discovery.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOutcome {
    /// Total reported by the index.
    pub total: u64,
    /// Collected names, in no particular order. May contain duplicates.
    pub names: Vec<String>,
    /// Pages that failed the pool pass and the retry pass.
    pub failed_pages: Vec<u32>,
}

/// Number of pages needed to list `total` items.
#[must_use]
pub fn page_count(total: u64, page_size: u32) -> u32 {
    let page_size = u64::from(page_size.max(1));
    u32::try_from(total.div_ceil(page_size)).unwrap_or(u32::MAX)
}

type SharedNames = Arc<Mutex<Vec<String>>>;

fn append(names: &SharedNames, batch: Vec<String>) {
    names
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .extend(batch);
}

/// Collect every repository name known to the search index.
///
/// # Errors
/// [`HarvestError::Total`] when the total count cannot be fetched,
/// [`HarvestError::TotalTooLarge`] when it needs more than
/// `options.max_pages` pages, and
/// [`HarvestError::Cancelled`] when `shutdown` fires before discovery ends.
/// Individual page failures are not errors.
pub async fn discover(
    client: &UpstreamClient,
    options: &DiscoveryOptions,
    progress_interval: Duration,
    shutdown: &Shutdown,
    on_progress: Option<SharedProgress>,
) -> Result<DiscoveryOutcome, HarvestError> {
    emit(on_progress.as_deref(), HarvestProgress::DiscoveryStarted);

    let total = client
        .fetch_total(&options.retry, shutdown, on_progress.as_deref())
        .await
        .map_err(|e| match e {
            UpstreamError::Cancelled => HarvestError::Cancelled,
            other => HarvestError::Total(other),
        })?;

    let page_size = options.page_size.max(1);
    let needed = total.div_ceil(u64::from(page_size));
    if needed > u64::from(options.max_pages) {
        tracing::error!(
            total,
            pages = needed,
            max_pages = options.max_pages,
            "Reported total exceeds the page limit"
        );
        return Err(HarvestError::TotalTooLarge {
            total,
            pages: needed,
            max_pages: options.max_pages,
        });
    }
    let pages = page_count(total, page_size);
    tracing::info!(total, pages, page_size, "Resolved search index size");
    emit(
        on_progress.as_deref(),
        HarvestProgress::TotalResolved {
            total,
            pages,
            page_size,
        },
    );

    if pages == 0 {
        emit(
            on_progress.as_deref(),
            HarvestProgress::DiscoveryComplete {
                names: 0,
                failed_pages: 0,
            },
        );
        return Ok(DiscoveryOutcome {
            total,
            ..DiscoveryOutcome::default()
        });
    }

    // Pre-filled and closed: workers stop when it drains.
    let (page_tx, page_rx) = mpsc::channel::<u32>(pages as usize);
    for page in 1..=pages {
        if page_tx.try_send(page).is_err() {
            break;
        }
    }
    drop(page_tx);
    let page_rx = Arc::new(tokio::sync::Mutex::new(page_rx));

    let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<u32>();
    let names: SharedNames = Arc::new(Mutex::new(Vec::new()));

    let _ticker = ProgressTicker::spawn(
        progress_interval,
        Stage::Discovery,
        total,
        {
            let names = Arc::clone(&names);
            move || names.lock().unwrap_or_else(PoisonError::into_inner).len()
        },
        on_progress.clone(),
    );

    let workers = options.workers.clamp(1, pages as usize);
    let mut handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let client = client.clone();
        let page_rx = Arc::clone(&page_rx);
        let retry_tx = retry_tx.clone();
        let names = Arc::clone(&names);
        let shutdown = shutdown.clone();
        let on_progress = on_progress.clone();
        let policy = options.retry.clone();

        handles.push(tokio::spawn(async move {
            loop {
                let Some(page) = page_rx.lock().await.recv().await else {
                    break;
                };
                match client
                    .fetch_page(page, page_size, &policy, &shutdown, on_progress.as_deref())
                    .await
                {
                    Ok(batch) => append(&names, batch),
                    Err(UpstreamError::Cancelled) => break,
                    Err(e) => {
                        tracing::warn!(page, error = %e, "Page fetch failed, queued for retry");
                        emit(
                            on_progress.as_deref(),
                            HarvestProgress::PageFailed {
                                page,
                                error: e.short_message(),
                                final_attempt: false,
                            },
                        );
                        // Receiver outlives every worker.
                        let _ = retry_tx.send(page);
                    }
                }
            }
        }));
    }
    drop(retry_tx);

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Discovery worker panicked");
        }
    }

    if shutdown.is_triggered() {
        return Err(HarvestError::Cancelled);
    }

    let mut retry_pages = Vec::new();
    while let Ok(page) = retry_rx.try_recv() {
        retry_pages.push(page);
    }
    retry_pages.sort_unstable();

    let mut failed_pages = Vec::new();
    if !retry_pages.is_empty() {
        tracing::info!(pages = retry_pages.len(), "Retrying failed pages");
        emit(
            on_progress.as_deref(),
            HarvestProgress::RetryPassStarted {
                pages: retry_pages.len(),
            },
        );

        for page in retry_pages {
            match client
                .fetch_page(
                    page,
                    page_size,
                    &options.retry,
                    shutdown,
                    on_progress.as_deref(),
                )
                .await
            {
                Ok(batch) => append(&names, batch),
                Err(UpstreamError::Cancelled) => return Err(HarvestError::Cancelled),
                Err(e) => {
                    tracing::warn!(page, error = %e, "Page failed again, dropping");
                    emit(
                        on_progress.as_deref(),
                        HarvestProgress::PageFailed {
                            page,
                            error: e.short_message(),
                            final_attempt: true,
                        },
                    );
                    failed_pages.push(page);
                }
            }
        }
    }

    let names = std::mem::take(&mut *names.lock().unwrap_or_else(PoisonError::into_inner));
    tracing::info!(
        names = names.len(),
        total,
        failed_pages = failed_pages.len(),
        "Discovery complete"
    );
    emit(
        on_progress.as_deref(),
        HarvestProgress::DiscoveryComplete {
            names: names.len(),
            failed_pages: failed_pages.len(),
        },
    );

    Ok(DiscoveryOutcome {
        total,
        names,
        failed_pages,
    })
}

//! Harvest options, results and tuning constants.

use std::time::Duration;

use thiserror::Error;

use crate::repository::{DEFAULT_CHUNK_SIZE, RepositoryError, default_write_retry};
use crate::retry::{RetryConfig, RetryPolicy};
use crate::upstream::UpstreamError;

use super::report::TopEntry;

/// Repositories requested per search page.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound on search pages per run. A reported total that needs more
/// pages is rejected instead of queued.
pub const DEFAULT_MAX_PAGES: u32 = 200_000;

/// Concurrent search page fetches.
pub const DEFAULT_PAGE_WORKERS: usize = 10;

/// Attempts per search page before it goes to the retry queue.
pub const PAGE_MAX_ATTEMPTS: u32 = 5;

/// Base of the page backoff, doubled per retry.
pub const PAGE_BACKOFF_BASE_MS: u64 = 500;

/// Upper bound (exclusive) of the random term added to page backoff.
pub const PAGE_BACKOFF_JITTER_MS: u64 = 300;

/// Concurrent detail fetches.
pub const DEFAULT_DETAIL_WORKERS: usize = 40;

/// Detail requests per second across all workers.
pub const DEFAULT_RATE_PER_SECOND: u32 = 100;

/// Attempts per detail fetch.
pub const DETAIL_MAX_ATTEMPTS: u32 = 6;

/// First detail backoff delay in milliseconds.
pub const DETAIL_INITIAL_BACKOFF_MS: u64 = 1_000;

/// Ceiling for computed backoff delays in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Seconds between progress heartbeats.
pub const DEFAULT_PROGRESS_INTERVAL_SECS: u64 = 30;

/// Entries in the end-of-run star ranking.
pub const DEFAULT_TOP_N: usize = 10;

/// Knobs for the page discovery stage.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Items per search page.
    pub page_size: u32,
    /// Worker pool size.
    pub workers: usize,
    /// Retry policy for the total count and each page.
    pub retry: RetryPolicy,
    /// Largest page count accepted from the reported total.
    pub max_pages: u32,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            workers: DEFAULT_PAGE_WORKERS,
            retry: RetryPolicy::page(),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Knobs for the detail fetch stage.
#[derive(Debug, Clone)]
pub struct DetailOptions {
    /// Worker pool size.
    pub workers: usize,
    /// Shared token rate.
    pub rate_per_second: u32,
    /// Retry policy for each detail request.
    pub retry: RetryPolicy,
}

impl Default for DetailOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_DETAIL_WORKERS,
            rate_per_second: DEFAULT_RATE_PER_SECOND,
            retry: RetryPolicy::detail(),
        }
    }
}

/// Options for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub discovery: DiscoveryOptions,
    pub detail: DetailOptions,
    /// Heartbeat period for stage progress. Zero disables heartbeats.
    pub progress_interval: Duration,
    /// Rows per INSERT during bulk sync.
    pub write_chunk_size: usize,
    /// Retry policy for the bulk write.
    pub write_retry: RetryConfig,
    /// Entries in the star ranking.
    pub top_n: usize,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            discovery: DiscoveryOptions::default(),
            detail: DetailOptions::default(),
            progress_interval: Duration::from_secs(DEFAULT_PROGRESS_INTERVAL_SECS),
            write_chunk_size: DEFAULT_CHUNK_SIZE,
            write_retry: default_write_retry(),
            top_n: DEFAULT_TOP_N,
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    /// Total reported by the search index.
    pub total: u64,
    /// Names collected by discovery, duplicates included.
    pub discovered: usize,
    /// Pages lost after both discovery passes.
    pub failed_pages: Vec<u32>,
    /// Distinct records fetched.
    pub fetched: usize,
    /// Detail jobs that failed.
    pub failed_details: usize,
    /// Rows written by bulk sync.
    pub saved: u64,
    /// Most-starred repositories, descending.
    pub top: Vec<TopEntry>,
    pub elapsed: Duration,
    /// Whether the run was cut short by cancellation.
    pub cancelled: bool,
}

/// Run-level failures. Per-page and per-repository failures never end up
/// here; they are logged and counted in [`HarvestReport`].
#[derive(Debug, Error)]
pub enum HarvestError {
    /// The search index total could not be determined.
    #[error("failed to fetch repository total: {0}")]
    Total(#[source] UpstreamError),

    /// The reported total needs more pages than one run accepts.
    #[error("search index reports {total} repositories ({pages} pages), above the limit of {max_pages} pages")]
    TotalTooLarge { total: u64, pages: u64, max_pages: u32 },

    /// The bulk write failed.
    #[error("failed to store repositories: {0}")]
    Storage(#[from] RepositoryError),

    /// Cancelled before any data was collected.
    #[error("harvest cancelled")]
    Cancelled,
}

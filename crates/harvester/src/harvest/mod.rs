//! The harvest pipeline.
//!
//! A run has three stages:
//!
//! 1. [`discovery`] pages through the search index and collects names.
//! 2. [`detail`] fetches every record under a shared rate limit into an
//!    [`Accumulator`].
//! 3. [`persist`] upserts the accumulated records in one transaction.
//!
//! [`Harvester`] drives the stages and produces a [`HarvestReport`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use harvester::harvest::{HarvestOptions, Harvester};
//! use harvester::shutdown::Shutdown;
//! use harvester::upstream::{UpstreamClient, UpstreamConfig};
//!
//! let client = UpstreamClient::new(&UpstreamConfig::default())?;
//! let db = Arc::new(harvester::connect_and_migrate("sqlite://harvest.db?mode=rwc").await?);
//! let report = Harvester::new(client, db, HarvestOptions::default())
//!     .run(&Shutdown::new())
//!     .await?;
//! println!("saved {} repositories", report.saved);
//! ```

mod accumulator;
pub mod detail;
pub mod discovery;
mod engine;
mod persist;
mod progress;
mod report;
mod types;

pub use accumulator::Accumulator;
pub use detail::{DetailOutcome, fetch_details};
pub use discovery::{DiscoveryOutcome, discover, page_count};
pub use engine::Harvester;
pub use persist::persist;
pub use progress::{HarvestProgress, ProgressCallback, SharedProgress, Stage, emit};
pub use report::{TopEntry, format_top, rank_by_stars};
pub use types::{
    DetailOptions, DiscoveryOptions, HarvestError, HarvestOptions, HarvestReport,
};

pub use types::{
    DEFAULT_DETAIL_WORKERS, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, DEFAULT_PAGE_WORKERS,
    DEFAULT_PROGRESS_INTERVAL_SECS, DEFAULT_RATE_PER_SECOND, DEFAULT_TOP_N,
    DETAIL_INITIAL_BACKOFF_MS, DETAIL_MAX_ATTEMPTS, MAX_BACKOFF_MS, PAGE_BACKOFF_BASE_MS,
    PAGE_BACKOFF_JITTER_MS, PAGE_MAX_ATTEMPTS,
};

//! Client for the upstream repository-hosting API.
//!
//! Two endpoints are used: the paginated search listing (for names and the
//! total count) and the per-repository detail record. All calls go through
//! the [`RetryEngine`](crate::retry::RetryEngine).

mod client;
mod error;
mod types;

pub use client::{
    DEFAULT_BASE_URL, DEFAULT_SEARCH_PATH, DEFAULT_TIMEOUT_SECS, DEFAULT_USER_AGENT,
    UpstreamClient, UpstreamConfig,
};
pub use error::{Result, UpstreamError};
pub use types::{RepositoryRecord, SearchEntry, SearchPage};

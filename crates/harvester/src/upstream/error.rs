//! Error types for upstream API operations.

use thiserror::Error;

use crate::http::HttpError;

/// Errors that can occur when talking to the upstream API.
///
/// `Transport`, `Decode`, `RateLimited` and `Server` are retryable and only
/// surface wrapped in [`UpstreamError::Exhausted`].
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(#[from] HttpError),

    /// Body did not decode into the expected shape.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Upstream answered 429.
    #[error("429 Too Many Requests")]
    RateLimited,

    /// Upstream answered with a 5xx status.
    #[error("server error: {status}")]
    Server { status: u16 },

    /// Any other non-success status. Never retried.
    #[error("unexpected status {status}: {body}")]
    Permanent { status: u16, body: String },

    /// Retry budget spent; carries the last observed failure.
    #[error("giving up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<UpstreamError>,
    },

    /// The run was cancelled while this request was pending.
    #[error("cancelled")]
    Cancelled,
}

impl UpstreamError {
    /// Whether another attempt could plausibly succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamError::Transport(_)
                | UpstreamError::Decode(_)
                | UpstreamError::RateLimited
                | UpstreamError::Server { .. }
        )
    }

    /// Short description suitable for a progress line.
    #[must_use]
    pub fn short_message(&self) -> String {
        match self {
            UpstreamError::Transport(_) => "Network error".to_string(),
            UpstreamError::Decode(_) => "JSON parse error".to_string(),
            UpstreamError::RateLimited => "Rate limited".to_string(),
            UpstreamError::Server { status } => format!("HTTP {status}"),
            UpstreamError::Permanent { status, body } => {
                if body.chars().count() > 50 {
                    let truncated: String = body.chars().take(47).collect();
                    format!("HTTP {status}: {truncated}...")
                } else {
                    format!("HTTP {status}: {body}")
                }
            }
            UpstreamError::Exhausted { attempts, last } => {
                format!("{} (after {attempts} attempts)", last.short_message())
            }
            UpstreamError::Cancelled => "Cancelled".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, UpstreamError>;

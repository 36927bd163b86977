//! Retry and backoff for upstream requests.
//!
//! [`RetryEngine::get_json`] wraps a single idempotent GET. Every attempt is
//! classified as success, retryable (transport error, decode failure, 429,
//! 5xx) or permanent (any other status). Retryable failures sleep before the
//! next attempt; on a 429 the upstream's own wait hint wins over the local
//! backoff whenever one of the configured headers resolves to a positive
//! duration.
//!
//! [`RetryConfig`] is the separate, backon-based policy used for storage
//! writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::ExponentialBuilder;
use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;

use crate::harvest::{
    DETAIL_INITIAL_BACKOFF_MS, DETAIL_MAX_ATTEMPTS, HarvestProgress, MAX_BACKOFF_MS,
    PAGE_BACKOFF_BASE_MS, PAGE_BACKOFF_JITTER_MS, PAGE_MAX_ATTEMPTS, ProgressCallback, emit,
};
use crate::http::{HttpHeaders, HttpRequest, HttpTransport, header_get};
use crate::shutdown::Shutdown;
use crate::upstream::{Result, UpstreamError};

// ─── Backoff policies ────────────────────────────────────────────────────────

/// How the delay between attempts grows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backoff {
    /// Start at `initial` and double after every backoff sleep.
    ///
    /// A sleep dictated by a wait header does not advance the doubling.
    Doubling { initial: Duration },
    /// `base * 2^n` plus a uniform random term in `[0, jitter)`, where `n`
    /// counts previous backoff sleeps.
    Jittered { base: Duration, jitter: Duration },
}

/// Attempt budget plus delay schedule for one kind of request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Upper bound for computed backoff delays. Wait headers are not capped.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy for per-repository detail fetches.
    #[must_use]
    pub fn detail() -> Self {
        Self {
            max_attempts: DETAIL_MAX_ATTEMPTS,
            backoff: Backoff::Doubling {
                initial: Duration::from_millis(DETAIL_INITIAL_BACKOFF_MS),
            },
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }

    /// Policy for search page fetches.
    #[must_use]
    pub fn page() -> Self {
        Self {
            max_attempts: PAGE_MAX_ATTEMPTS,
            backoff: Backoff::Jittered {
                base: Duration::from_millis(PAGE_BACKOFF_BASE_MS),
                jitter: Duration::from_millis(PAGE_BACKOFF_JITTER_MS),
            },
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }

    fn schedule(&self) -> Schedule<'_> {
        Schedule {
            policy: self,
            sleeps: 0,
        }
    }
}

struct Schedule<'a> {
    policy: &'a RetryPolicy,
    sleeps: u32,
}

impl Schedule<'_> {
    fn next_delay(&mut self) -> Duration {
        let exp = 2u32.saturating_pow(self.sleeps);
        self.sleeps += 1;
        let delay = match &self.policy.backoff {
            Backoff::Doubling { initial } => initial.saturating_mul(exp),
            Backoff::Jittered { base, jitter } => {
                let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..jitter_ms)
                };
                base.saturating_mul(exp) + Duration::from_millis(extra)
            }
        };
        delay.min(self.policy.max_delay)
    }
}

// ─── Wait headers ────────────────────────────────────────────────────────────

/// Names of the headers consulted on a 429, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryAfterHeaders {
    /// Provider-specific "retry after N seconds".
    pub retry_after_seconds: String,
    /// Standard `Retry-After` (seconds or any HTTP-date form).
    pub retry_after: String,
    /// Provider-specific rate-limit reset, in epoch seconds.
    pub reset_epoch: String,
}

impl Default for RetryAfterHeaders {
    fn default() -> Self {
        Self {
            retry_after_seconds: "GitVerse-RateLimit-Retry-After".to_string(),
            retry_after: "Retry-After".to_string(),
            reset_epoch: "Gitverse-Ratelimit-Reset".to_string(),
        }
    }
}

/// Resolve the upstream's requested wait from `headers`.
///
/// The provider seconds header is used only when it holds a positive integer.
/// Otherwise the first of `Retry-After` or the reset header that parses
/// decides; a result that is not strictly positive yields `None`.
#[must_use]
pub fn parse_retry_after(
    headers: &HttpHeaders,
    names: &RetryAfterHeaders,
    now: DateTime<Utc>,
) -> Option<Duration> {
    if let Some(secs) = header_get(headers, &names.retry_after_seconds)
        .and_then(|v| v.trim().parse::<i64>().ok())
        && secs > 0
    {
        return Some(Duration::from_secs(secs.unsigned_abs()));
    }

    if let Some(value) = header_get(headers, &names.retry_after).map(str::trim) {
        if let Ok(secs) = value.parse::<i64>() {
            return positive_secs(secs);
        }
        if let Some(at) = parse_http_date(value) {
            return positive(at - now);
        }
    }

    if let Some(epoch) = header_get(headers, &names.reset_epoch)
        .and_then(|v| v.trim().parse::<i64>().ok())
        && let Some(reset) = DateTime::<Utc>::from_timestamp(epoch, 0)
    {
        // One second past the reset instant.
        return positive(reset - now + chrono::Duration::seconds(1));
    }

    None
}

/// Parse an HTTP-date in any of the three forms RFC 9110 requires
/// recipients to accept: IMF-fixdate (RFC 1123), RFC 850 and asctime.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc2822(value) {
        return Some(at.with_timezone(&Utc));
    }
    // Sunday, 06-Nov-94 08:49:37 GMT
    if let Ok(at) = NaiveDateTime::parse_from_str(value, "%A, %d-%b-%y %H:%M:%S GMT") {
        return Some(at.and_utc());
    }
    // Sun Nov  6 08:49:37 1994
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    NaiveDateTime::parse_from_str(&collapsed, "%a %b %d %H:%M:%S %Y")
        .ok()
        .map(|at| at.and_utc())
}

fn positive_secs(secs: i64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs.unsigned_abs()))
}

fn positive(delta: chrono::Duration) -> Option<Duration> {
    delta.to_std().ok().filter(|d| !d.is_zero())
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// Default cap on the response body quoted in a permanent error.
pub const DEFAULT_BODY_EXCERPT: usize = 4096;

/// Executes upstream GETs with bounded retries.
#[derive(Clone)]
pub struct RetryEngine {
    transport: Arc<dyn HttpTransport>,
    headers: RetryAfterHeaders,
    body_excerpt: usize,
}

impl RetryEngine {
    pub fn new(transport: Arc<dyn HttpTransport>, headers: RetryAfterHeaders) -> Self {
        Self {
            transport,
            headers,
            body_excerpt: DEFAULT_BODY_EXCERPT,
        }
    }

    #[must_use]
    pub fn with_body_excerpt(mut self, limit: usize) -> Self {
        self.body_excerpt = limit;
        self
    }

    /// Fetch `request` and decode the body as `T`.
    ///
    /// `target` labels the request in logs and progress events. Both the
    /// in-flight request and any backoff sleep are abandoned as soon as
    /// `shutdown` fires.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        policy: &RetryPolicy,
        target: &str,
        shutdown: &Shutdown,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<T> {
        let max_attempts = policy.max_attempts.max(1);
        let mut schedule = policy.schedule();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if shutdown.is_triggered() {
                return Err(UpstreamError::Cancelled);
            }

            let sent = tokio::select! {
                res = self.transport.send(request.clone()) => res,
                () = shutdown.cancelled() => return Err(UpstreamError::Cancelled),
            };

            let (err, hinted) = match sent {
                Err(e) => (UpstreamError::Transport(e), None),
                Ok(resp) if resp.status == 429 => (
                    UpstreamError::RateLimited,
                    parse_retry_after(&resp.headers, &self.headers, Utc::now()),
                ),
                Ok(resp) if resp.status >= 500 => {
                    (UpstreamError::Server { status: resp.status }, None)
                }
                Ok(resp) if (200..300).contains(&resp.status) => {
                    match serde_json::from_slice::<T>(&resp.body) {
                        Ok(value) => return Ok(value),
                        Err(e) => (UpstreamError::Decode(e), None),
                    }
                }
                Ok(resp) => (
                    UpstreamError::Permanent {
                        status: resp.status,
                        body: resp.body_excerpt(self.body_excerpt),
                    },
                    None,
                ),
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(UpstreamError::Exhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = hinted.unwrap_or_else(|| schedule.next_delay());
            tracing::debug!(
                target_name = target,
                attempt,
                delay_ms = delay.as_millis() as u64,
                honored_header = hinted.is_some(),
                error = %err,
                "retrying upstream request"
            );
            emit(
                on_progress,
                HarvestProgress::RateLimitBackoff {
                    target: target.to_string(),
                    retry_after_ms: delay.as_millis() as u64,
                    attempt,
                },
            );

            if !shutdown.sleep(delay).await {
                return Err(UpstreamError::Cancelled);
            }
        }
    }
}

// ─── Storage retry ───────────────────────────────────────────────────────────

/// Backon configuration for retrying storage writes.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            max_retries: 3,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Counts attempts made by a backon-driven operation, for log fields.
#[derive(Debug, Default)]
pub(crate) struct AttemptCounter(AtomicU32);

impl AttemptCounter {
    pub(crate) fn bump(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

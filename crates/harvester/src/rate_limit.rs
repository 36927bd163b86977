//! Fixed-rate token feed shared by the detail workers.
//!
//! A background task ticks every `1/R` seconds and offers a [`RateToken`] to a
//! single-slot channel. A tick that finds the slot still occupied is dropped,
//! so idle periods never build up a burst allowance beyond one token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::shutdown::Shutdown;

/// Permission to issue one request now.
#[derive(Debug)]
pub struct RateToken(());

/// Smallest tick interval the limiter will use.
pub const MIN_TICK: Duration = Duration::from_millis(1);

/// Compute the tick interval for `rate_per_second`, clamped to [`MIN_TICK`].
#[must_use]
pub fn tick_interval(rate_per_second: u32) -> Duration {
    let rate = rate_per_second.max(1);
    (Duration::from_secs(1) / rate).max(MIN_TICK)
}

/// Token emitter. The ticker task stops when the limiter is dropped.
pub struct RateLimiter {
    tokens: Arc<Mutex<mpsc::Receiver<RateToken>>>,
    ticker: JoinHandle<()>,
    interval: Duration,
}

impl RateLimiter {
    /// Start emitting tokens at `rate_per_second`.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn start(rate_per_second: u32) -> Self {
        let interval = tick_interval(rate_per_second);
        let (tx, rx) = mpsc::channel(1);

        let ticker = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticks.tick().await;
                match tx.try_send(RateToken(())) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
        });

        Self {
            tokens: Arc::new(Mutex::new(rx)),
            ticker,
            interval,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait for the next token.
    ///
    /// Returns `None` when `shutdown` fires first or the feed has stopped.
    pub async fn acquire(&self, shutdown: &Shutdown) -> Option<RateToken> {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => None,
            token = async { self.tokens.lock().await.recv().await } => token,
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_interval_is_inverse_of_rate() {
        assert_eq!(tick_interval(100), Duration::from_millis(10));
        assert_eq!(tick_interval(4), Duration::from_millis(250));
    }

    #[test]
    fn tick_interval_never_drops_below_one_millisecond() {
        assert_eq!(tick_interval(10_000), MIN_TICK);
        assert_eq!(tick_interval(u32::MAX), MIN_TICK);
    }

    #[test]
    fn zero_rate_is_treated_as_one_per_second() {
        assert_eq!(tick_interval(0), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_consumption_converges_to_configured_rate() {
        let limiter = RateLimiter::start(10);
        let shutdown = Shutdown::new();

        let started = tokio::time::Instant::now();
        let mut acquired = 0u32;
        while started.elapsed() < Duration::from_secs(10) {
            limiter
                .acquire(&shutdown)
                .await
                .expect("token feed should be live");
            acquired += 1;
        }

        assert!(
            (99..=102).contains(&acquired),
            "expected ~100 tokens in 10s, got {acquired}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn idle_time_does_not_accumulate_tokens() {
        let limiter = RateLimiter::start(10);
        let shutdown = Shutdown::new();

        tokio::time::sleep(Duration::from_secs(5)).await;

        // One token may be parked in the slot; everything else was dropped.
        let started = tokio::time::Instant::now();
        for _ in 0..3 {
            limiter.acquire(&shutdown).await.expect("token");
        }
        assert!(
            started.elapsed() >= Duration::from_millis(100),
            "burst after idle period: {:?}",
            started.elapsed()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_consumers_share_the_rate() {
        let limiter = Arc::new(RateLimiter::start(20));
        let shutdown = Shutdown::new();
        let started = tokio::time::Instant::now();

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    for _ in 0..5 {
                        limiter.acquire(&shutdown).await.expect("token");
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.await.expect("worker should not panic");
        }

        // 40 tokens at 20/s take just under two seconds.
        assert!(started.elapsed() >= Duration::from_millis(1900));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_returns_none_after_shutdown() {
        let limiter = RateLimiter::start(1);
        let shutdown = Shutdown::new();
        limiter.acquire(&shutdown).await.expect("first tick is immediate");

        shutdown.trigger();
        assert!(limiter.acquire(&shutdown).await.is_none());
    }
}

//! Two independent token-bucket gates for chat and embedding calls
//! (spec.md §4.5). The scheduler never batches requests under a single
//! permit: one AI call acquires exactly one permit.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tokio::time::sleep;

/// Minimum enforced QPS for either limiter (spec.md §4.5).
const MIN_QPS: f64 = 0.1;

struct BucketState {
    /// Instant at which the next permit becomes available.
    next_available: Instant,
}

/// A single token-bucket rate limiter gating calls to one QPS figure.
pub struct RateLimiter {
    interval: Duration,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Build a limiter for `qps`, clamped to a minimum of 0.1 requests/sec.
    pub fn new(qps: f64) -> Self {
        let effective_qps = qps.max(MIN_QPS);
        let interval = Duration::from_secs_f64(1.0 / effective_qps);
        Self {
            interval,
            state: Mutex::new(BucketState { next_available: Instant::now() }),
        }
    }

    /// Block the caller until a permit is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                #[allow(clippy::unwrap_used)]
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                if state.next_available <= now {
                    state.next_available = now + self.interval;
                    None
                } else {
                    let wait = state.next_available - now;
                    state.next_available += self.interval;
                    Some(wait)
                }
            };

            match wait {
                None => return,
                Some(duration) => sleep(duration).await,
            }
        }
    }
}

/// Pair of independent limiters for chat and embedding traffic.
pub struct RateLimiters {
    pub chat: RateLimiter,
    pub embed: RateLimiter,
}

impl RateLimiters {
    pub fn new(chat_qps: f64, embed_qps: f64) -> Self {
        Self { chat: RateLimiter::new(chat_qps), embed: RateLimiter::new(embed_qps) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_never_panics_and_resolves() {
        let limiter = RateLimiter::new(1000.0);
        limiter.acquire().await;
        limiter.acquire().await;
    }

    #[tokio::test]
    async fn qps_is_floored_at_minimum() {
        let limiter = RateLimiter::new(0.0);
        assert_eq!(limiter.interval, Duration::from_secs_f64(1.0 / MIN_QPS));
    }

    #[tokio::test]
    async fn serializes_calls_to_roughly_the_configured_rate() {
        let limiter = RateLimiter::new(50.0);
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        // Three permits at 50 qps take at least ~2 intervals (40ms).
        assert!(start.elapsed() >= Duration::from_millis(30));
    }
}

//! Token-bucket rate limiting for source API calls.
//!
//! One limiter per source, capacity expressed in requests per 60-second
//! window. The bucket refills continuously; `acquire` never blocks, `wait`
//! polls at a fixed short interval with no upper bound (callers needing a
//! deadline must wrap it externally).
//!
//! A zero rate cannot be constructed: limits are `NonZeroU32`, so a
//! permanently-empty bucket is ruled out at configuration time rather than
//! hanging a worker at runtime.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Poll interval for [`RateLimiter::wait`].
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Token bucket limiter for a single source.
#[derive(Debug)]
pub struct RateLimiter {
    /// Bucket capacity = requests per 60-second window.
    capacity: f64,
    inner: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter allowing `rate_per_minute` requests per minute.
    ///
    /// The bucket starts full.
    #[must_use]
    pub fn new(rate_per_minute: NonZeroU32) -> Self {
        let capacity = f64::from(rate_per_minute.get());
        Self {
            capacity,
            inner: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Try to take `n` tokens. Returns `false` without blocking when the
    /// bucket holds fewer than `n` tokens.
    pub fn acquire(&self, n: u32) -> bool {
        let mut bucket = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.capacity / 60.0).min(self.capacity);
        bucket.last_refill = now;

        let needed = f64::from(n);
        if bucket.tokens >= needed {
            bucket.tokens -= needed;
            true
        } else {
            false
        }
    }

    /// Block the calling task until `n` tokens are available.
    pub async fn wait(&self, n: u32) {
        while !self.acquire(n) {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

/// Registry holding one limiter per source for the process lifetime.
///
/// Owned by the orchestrator and handed to pipelines at construction time;
/// there is no process-wide implicit registry.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the limiter for `source`, creating it with `rate_per_minute` on
    /// first use. The rate of an existing limiter is not changed.
    pub fn limiter(&self, source: &str, rate_per_minute: NonZeroU32) -> Arc<RateLimiter> {
        let mut limiters = self
            .limiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        limiters
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(rate_per_minute)))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate(n: u32) -> NonZeroU32 {
        NonZeroU32::new(n).unwrap()
    }

    #[test]
    fn test_single_token_accept_then_reject() {
        let limiter = RateLimiter::new(rate(1));
        assert!(limiter.acquire(1));
        // Refill within the same instant is negligible.
        assert!(!limiter.acquire(1));
    }

    #[test]
    fn test_bucket_starts_full() {
        let limiter = RateLimiter::new(rate(5));
        for _ in 0..5 {
            assert!(limiter.acquire(1));
        }
        assert!(!limiter.acquire(1));
    }

    #[test]
    fn test_multi_token_acquire() {
        let limiter = RateLimiter::new(rate(10));
        assert!(limiter.acquire(10));
        assert!(!limiter.acquire(1));
    }

    #[test]
    fn test_refill_over_time() {
        let limiter = RateLimiter::new(rate(6000));
        assert!(limiter.acquire(6000));
        assert!(!limiter.acquire(1));

        // 6000/min refills 100 tokens per second.
        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.acquire(1));
    }

    #[test]
    fn test_concurrent_acquire_never_over_issues() {
        let limiter = Arc::new(RateLimiter::new(rate(10)));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                (0..10).filter(|_| limiter.acquire(1)).count()
            }));
        }
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert!(granted <= 10, "issued {granted} tokens from a bucket of 10");
    }

    #[test]
    fn test_registry_caches_per_source() {
        let registry = RateLimiterRegistry::new();
        let a = registry.limiter("coingecko", rate(50));
        let b = registry.limiter("coingecko", rate(50));
        let c = registry.limiter("coinpaprika", rate(10));

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_wait_returns_when_tokens_refill() {
        // 600/min refills 10 tokens per second, so a drained bucket
        // recovers one token within ~100ms.
        let limiter = RateLimiter::new(rate(600));
        assert!(limiter.acquire(600));
        limiter.wait(1).await;
    }
}

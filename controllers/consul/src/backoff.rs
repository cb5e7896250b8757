//! # Requeue backoff
//!
//! Failed reconciles are requeued after the larger of two delays:
//!
//! - a per-key exponential backoff, 200ms doubling up to 5s, so a config
//!   entry waiting on another one (a router waiting for its service's
//!   protocol, say) is retried quickly;
//! - a token bucket shared by every kind, 10 per second with a burst of 100,
//!   so a mass failure cannot hammer the Consul servers.
//!
//! A successful reconcile forgets the key.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// First retry delay.
pub const BASE_DELAY: Duration = Duration::from_millis(200);

/// Cap on the per-key delay.
pub const MAX_DELAY: Duration = Duration::from_secs(5);

/// Shared retry rate, per second.
pub const BUCKET_RATE: f64 = 10.0;

/// Shared retry burst.
pub const BUCKET_BURST: f64 = 100.0;

/// Per-key exponential backoff.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl ExponentialBackoff {
    /// Backoff starting at `base` and capped at `max`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    /// The delay for the next retry; advances the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.failures).unwrap_or(u32::MAX);
        self.failures = self.failures.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// Number of failures recorded since the last reset.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Start over from `base`.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}

/// Token bucket limiting the overall retry rate.
///
/// Reservations always succeed; once the bucket is empty they return how long
/// the caller has to wait for its token.
#[derive(Debug)]
pub struct TokenBucket {
    rate: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A full bucket.
    #[must_use]
    pub fn new(rate: f64, burst: f64) -> Self {
        Self::new_at(rate, burst, Instant::now())
    }

    fn new_at(rate: f64, burst: f64, now: Instant) -> Self {
        Self {
            rate,
            burst,
            tokens: burst,
            last: now,
        }
    }

    /// Take one token and return the delay until it is actually available.
    pub fn reserve(&mut self) -> Duration {
        self.reserve_at(Instant::now())
    }

    fn reserve_at(&mut self, now: Instant) -> Duration {
        let elapsed = now.saturating_duration_since(self.last).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.burst);
        self.last = self.last.max(now);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rate)
        }
    }
}

/// Requeue delays for every controller in the process.
#[derive(Debug)]
pub struct RequeueLimiter {
    per_key: Mutex<HashMap<String, ExponentialBackoff>>,
    bucket: Mutex<TokenBucket>,
}

impl Default for RequeueLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequeueLimiter {
    /// Limiter with the default delays and bucket.
    #[must_use]
    pub fn new() -> Self {
        Self {
            per_key: Mutex::new(HashMap::new()),
            bucket: Mutex::new(TokenBucket::new(BUCKET_RATE, BUCKET_BURST)),
        }
    }

    /// Delay before retrying `key` after another failure.
    pub fn when(&self, key: &str) -> Duration {
        let per_key = self
            .per_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| ExponentialBackoff::new(BASE_DELAY, MAX_DELAY))
            .next_backoff();
        let shared = self
            .bucket
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .reserve();
        per_key.max(shared)
    }

    /// Drop the failure history of `key`.
    pub fn forget(&self, key: &str) {
        self.per_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Failures recorded for `key`.
    #[must_use]
    pub fn failures(&self, key: &str) -> u32 {
        self.per_key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, ExponentialBackoff::failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_sequence_is_capped() {
        let mut backoff = ExponentialBackoff::new(BASE_DELAY, MAX_DELAY);
        let millis: Vec<u128> = (0..7).map(|_| backoff.next_backoff().as_millis()).collect();
        assert_eq!(millis, vec![200, 400, 800, 1600, 3200, 5000, 5000]);
    }

    #[test]
    fn test_exponential_survives_many_failures() {
        let mut backoff = ExponentialBackoff::new(BASE_DELAY, MAX_DELAY);
        for _ in 0..100 {
            backoff.next_backoff();
        }
        assert_eq!(backoff.next_backoff(), MAX_DELAY);
    }

    #[test]
    fn test_exponential_reset() {
        let mut backoff = ExponentialBackoff::new(BASE_DELAY, MAX_DELAY);
        backoff.next_backoff();
        backoff.next_backoff();
        backoff.reset();
        assert_eq!(backoff.next_backoff(), BASE_DELAY);
    }

    #[test]
    fn test_bucket_burst_then_rate() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new_at(10.0, 100.0, start);
        for _ in 0..100 {
            assert_eq!(bucket.reserve_at(start), Duration::ZERO);
        }
        let wait = bucket.reserve_at(start);
        assert!((wait.as_secs_f64() - 0.1).abs() < 1e-6, "got {wait:?}");

        // One second later ten tokens are back, one of them owed.
        let later = start + Duration::from_secs(1);
        for _ in 0..9 {
            assert_eq!(bucket.reserve_at(later), Duration::ZERO);
        }
        assert!(bucket.reserve_at(later) > Duration::ZERO);
    }

    #[test]
    fn test_limiter_forget_restarts_key() {
        let limiter = RequeueLimiter::new();
        assert_eq!(limiter.when("ServiceDefaults/default/web"), BASE_DELAY);
        assert_eq!(limiter.when("ServiceDefaults/default/web"), BASE_DELAY * 2);
        assert_eq!(limiter.failures("ServiceDefaults/default/web"), 2);
        assert_eq!(limiter.when("ServiceRouter/default/web"), BASE_DELAY, "keys are independent");

        limiter.forget("ServiceDefaults/default/web");
        assert_eq!(limiter.failures("ServiceDefaults/default/web"), 0);
        assert_eq!(limiter.when("ServiceDefaults/default/web"), BASE_DELAY);
    }
}

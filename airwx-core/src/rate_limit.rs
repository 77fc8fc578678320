use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter as Governor};
use std::num::NonZeroU32;

/// Request throttle consulted once per request, before any cache lookup.
pub trait RateLimiter: Send + Sync {
    fn allow(&self, key: &str) -> bool;

    /// Drop bookkeeping for idle clients.
    fn prune(&self) {}
}

/// Per-client token bucket.
pub struct KeyedRateLimiter {
    inner: DefaultKeyedRateLimiter<String>,
}

impl KeyedRateLimiter {
    /// Allow `requests_per_minute` per key, with a burst of the same size.
    /// Zero is treated as one.
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Governor::keyed(Quota::per_minute(rate)),
        }
    }
}

impl RateLimiter for KeyedRateLimiter {
    fn allow(&self, key: &str) -> bool {
        self.inner.check_key(&key.to_string()).is_ok()
    }

    /// Forget keys whose buckets have fully refilled.
    fn prune(&self) {
        self.inner.retain_recent();
    }
}

/// Never throttles.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unlimited;

impl RateLimiter for Unlimited {
    fn allow(&self, _key: &str) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn throttles_after_burst() {
        let limiter = KeyedRateLimiter::per_minute(3);
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(limiter.allow("10.0.0.1"));
        assert!(!limiter.allow("10.0.0.1"));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = KeyedRateLimiter::per_minute(1);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[test]
    fn prune_keeps_active_buckets() {
        let limiter = KeyedRateLimiter::per_minute(1);
        assert!(limiter.allow("a"));
        limiter.prune();
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn zero_rate_still_allows_one() {
        let limiter = KeyedRateLimiter::per_minute(0);
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
    }
}

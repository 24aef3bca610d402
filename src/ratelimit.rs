//! Per-key token bucket rate limiter.

use std::collections::HashMap;
use std::time::Instant;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket per key, refilled continuously at a fixed rate.
///
/// All buckets share one lock; each decision is O(1).
#[derive(Debug)]
pub struct RateLimiter {
    /// Tokens per second; zero or less disables limiting.
    rate: f64,
    burst: f64,
    // TODO: evict buckets idle for longer than a TTL; keys accumulate for the
    // life of the process.
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// `requests_per_minute` sets the refill rate, `burst` the bucket capacity.
    pub fn new(requests_per_minute: f64, burst: u32) -> Self {
        Self {
            rate: requests_per_minute / 60.0,
            burst: f64::from(burst),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.rate > 0.0
    }

    /// Take one token for `key`, returning whether the request may proceed.
    pub fn allow(&self, key: &str) -> bool {
        self.allow_at(key, Instant::now())
    }

    fn allow_at(&self, key: &str, now: Instant) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_refill: now,
        });

        let elapsed = now.saturating_duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

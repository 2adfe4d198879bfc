//! Fixed-window rate limiter keyed by API key id, applied after
//! authentication.

use std::time::{Duration, Instant};

use dashmap::DashMap;

const CLEANUP_EVERY_CHECKS: u64 = 512;

struct WindowState {
    window_start: Instant,
    count: u32,
}

pub struct RateLimiter {
    limit: u32,
    window: Duration,
    buckets: DashMap<String, WindowState>,
    checks: std::sync::atomic::AtomicU64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            buckets: DashMap::new(),
            checks: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Default policy: 100 requests per 60 seconds per key.
    #[must_use]
    pub fn default_policy() -> Self {
        Self::new(100, Duration::from_secs(60))
    }

    /// Record one request for `key`; false when over the limit.
    #[must_use]
    pub fn check(&self, key: &str) -> bool {
        let checks = self
            .checks
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if checks % CLEANUP_EVERY_CHECKS == CLEANUP_EVERY_CHECKS - 1 {
            self.evict_expired();
        }

        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(key.to_string())
            .or_insert_with(|| WindowState {
                window_start: now,
                count: 0,
            });
        if now.duration_since(bucket.window_start) >= self.window {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.count += 1;
        bucket.count <= self.limit
    }

    fn evict_expired(&self) {
        let now = Instant::now();
        self.buckets
            .retain(|_, bucket| now.duration_since(bucket.window_start) < self.window * 2);
    }
}

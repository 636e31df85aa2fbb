use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of checks between sweeps of idle buckets.
const SWEEP_INTERVAL: u64 = 256;

/// Sliding-window limiter keyed by caller and route.
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    window: Duration,
    max_requests: u32,
    buckets: Arc<DashMap<String, Vec<Instant>>>,
    checks: Arc<AtomicU64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Limited,
}

impl ApiRateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
            buckets: Arc::new(DashMap::new()),
            checks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// `caller` identifies the client (its peer address); `route` is the
    /// matched route pattern, so `/posts/1` and `/posts/2` share a bucket.
    pub fn check(&self, caller: &str, route: &str) -> RateDecision {
        self.check_at(caller, route, Instant::now())
    }

    fn check_at(&self, caller: &str, route: &str, now: Instant) -> RateDecision {
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_INTERVAL == SWEEP_INTERVAL - 1 {
            self.sweep(now);
        }

        let bucket_key = format!("{caller}:{route}");
        let window = self.window;

        let mut entry = self.buckets.entry(bucket_key).or_default();
        entry.retain(|instant| now.duration_since(*instant) < window);

        let remaining = self.max_requests.saturating_sub(entry.len() as u32);
        if remaining == 0 {
            return RateDecision::Limited;
        }

        entry.push(now);
        RateDecision::Allowed {
            remaining: remaining - 1,
        }
    }

    /// Drops buckets whose requests have all left the window. Must not run
    /// while a bucket entry is held.
    fn sweep(&self, now: Instant) {
        let window = self.window;
        self.buckets.retain(|_, stamps| {
            stamps.retain(|instant| now.duration_since(*instant) < window);
            !stamps.is_empty()
        });
    }

    pub fn retry_after_secs(&self) -> u64 {
        self.window.as_secs().max(1)
    }

    pub fn limit(&self) -> u32 {
        self.max_requests
    }
}

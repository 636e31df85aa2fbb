//! Cache configuration.
//!
//! TTLs for the two cached shapes and the retry budget used when invalidating.

use std::time::Duration;

use serde::Deserialize;

const DEFAULT_POST_TTL_SECS: u64 = 5 * 60 * 60;
const DEFAULT_MOST_LIKED_TTL_SECS: u64 = 30 * 60;
const DEFAULT_MOST_LIKED_LIMIT: u32 = 3;
const DEFAULT_INVALIDATION_ATTEMPTS: u32 = 3;
const DEFAULT_INVALIDATION_BACKOFF_MS: u64 = 50;
const DEFAULT_INVALIDATION_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached post view. A safety net; mutations invalidate explicitly.
    pub post_ttl_seconds: u64,
    /// Lifetime of the most-liked ranking. Likes do not invalidate it.
    pub most_liked_ttl_seconds: u64,
    /// Number of posts in the ranking.
    pub most_liked_limit: u32,
    /// Delete attempts before an invalidation is reported as failed.
    pub invalidation_attempts: u32,
    /// Linear backoff step between delete attempts.
    pub invalidation_backoff_ms: u64,
    /// Upper bound for a single delete attempt.
    pub invalidation_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            post_ttl_seconds: DEFAULT_POST_TTL_SECS,
            most_liked_ttl_seconds: DEFAULT_MOST_LIKED_TTL_SECS,
            most_liked_limit: DEFAULT_MOST_LIKED_LIMIT,
            invalidation_attempts: DEFAULT_INVALIDATION_ATTEMPTS,
            invalidation_backoff_ms: DEFAULT_INVALIDATION_BACKOFF_MS,
            invalidation_timeout_ms: DEFAULT_INVALIDATION_TIMEOUT_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            post_ttl_seconds: settings.post_ttl.as_secs(),
            most_liked_ttl_seconds: settings.most_liked_ttl.as_secs(),
            most_liked_limit: settings.most_liked_limit.get(),
            invalidation_attempts: settings.invalidation_attempts.get(),
            invalidation_backoff_ms: settings.invalidation_backoff.as_millis() as u64,
            invalidation_timeout_ms: settings.invalidation_timeout.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    pub fn post_ttl(&self) -> Duration {
        Duration::from_secs(self.post_ttl_seconds.max(1))
    }

    pub fn most_liked_ttl(&self) -> Duration {
        Duration::from_secs(self.most_liked_ttl_seconds.max(1))
    }

    /// At least one attempt is always made.
    pub fn invalidation_attempts(&self) -> u32 {
        self.invalidation_attempts.max(1)
    }

    pub fn invalidation_backoff(&self) -> Duration {
        Duration::from_millis(self.invalidation_backoff_ms)
    }

    pub fn invalidation_timeout(&self) -> Duration {
        Duration::from_millis(self.invalidation_timeout_ms.max(1))
    }
}

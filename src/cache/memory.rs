//! In-process cache backend.
//!
//! LRU-bounded, with expiry measured on the tokio clock so paused-time tests can
//! step past TTLs. Expired entries are dropped lazily on access.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::time::Instant;

use super::lock::mutex_lock;
use super::store::{Cache, CacheError};

const SOURCE: &str = "cache::memory";

struct Entry {
    value: Bytes,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

pub struct MemoryCache {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        let entries = mutex_lock(&self.entries, SOURCE, "len");
        entries.iter().filter(|(_, entry)| entry.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        let expired = match entries.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        mutex_lock(&self.entries, SOURCE, "set").put(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let removed = mutex_lock(&self.entries, SOURCE, "delete").pop(key);
        Ok(removed.is_some_and(|entry| entry.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_twice_reports_presence_then_absence() {
        let cache = MemoryCache::new(8);
        cache
            .set("42", Bytes::from_static(b"{}"), Duration::from_secs(60))
            .await
            .expect("set");

        assert!(cache.delete("42").await.expect("first delete"));
        assert!(!cache.delete("42").await.expect("second delete"));
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_and_resets_ttl() {
        let cache = MemoryCache::new(8);
        cache
            .set("k", Bytes::from_static(b"1"), Duration::from_secs(2))
            .await
            .expect("set");
        tokio::time::advance(Duration::from_secs(1)).await;
        cache
            .set("k", Bytes::from_static(b"2"), Duration::from_secs(2))
            .await
            .expect("set");
        tokio::time::advance(Duration::from_millis(1500)).await;

        let value = cache.get("k").await.expect("get");
        assert_eq!(value.as_deref(), Some(&b"2"[..]));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entries_read_as_missing() {
        let cache = MemoryCache::new(8);
        cache
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(1))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(cache.get("k").await.expect("get"), None);
        assert!(!cache.delete("k").await.expect("delete"));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let cache = MemoryCache::new(2);
        for key in ["a", "b", "c"] {
            cache
                .set(key, Bytes::from_static(b"v"), Duration::from_secs(60))
                .await
                .expect("set");
        }
        assert_eq!(cache.get("a").await.expect("get"), None);
        assert_eq!(cache.len(), 2);
    }
}

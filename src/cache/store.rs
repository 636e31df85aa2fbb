//! Cache port and the typed post/ranking view over it.
//!
//! Backends speak bytes. [`PostCache`] owns serialization: values are fully
//! encoded before `set`, and anything that fails to decode on `get` is treated
//! as a miss and counted separately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use picshare_api_types::PostView;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::types::PostId;

use super::config::CacheConfig;
use super::coordinator::InvalidationCoordinator;
use super::epochs::{FillEpochs, FillTicket};
use super::keys::CacheKey;

const SOURCE: &str = "cache::store";
const METRIC_HIT: &str = "picshare_cache_hit_total";
const METRIC_MISS: &str = "picshare_cache_miss_total";
const METRIC_UNAVAILABLE: &str = "picshare_cache_unavailable_total";
const METRIC_CORRUPT: &str = "picshare_cache_corrupt_total";
const METRIC_FILL_SUPERSEDED: &str = "picshare_cache_fill_superseded_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend unavailable during {op}: {message}")]
    Unavailable { op: &'static str, message: String },
    #[error("cache {op} timed out after {elapsed:?}")]
    Timeout {
        op: &'static str,
        elapsed: Duration,
    },
    #[error("cache value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CacheError {
    pub fn unavailable(op: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            op,
            message: err.to_string(),
        }
    }
}

/// Key-value store with per-entry TTL. Implementations must be safe to share
/// across request tasks without external locking.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Ok(None)` is a real miss; `Err` is a transport failure.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Overwrites any existing entry and resets its TTL.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Returns whether an entry was present. Idempotent.
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;
}

/// Outcome of a typed cache read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup<T> {
    Hit(T),
    Miss,
    /// The backend could not be reached; callers fall through to the store.
    Unavailable,
}

/// Whether a post fill left an entry behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillOutcome {
    Stored,
    /// The post was invalidated while the view was being loaded.
    Superseded,
}

#[derive(Clone)]
pub struct PostCache {
    backend: Arc<dyn Cache>,
    config: CacheConfig,
    epochs: Arc<FillEpochs>,
}

impl PostCache {
    pub fn new(backend: Arc<dyn Cache>, config: CacheConfig) -> Self {
        Self {
            backend,
            config,
            epochs: Arc::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Coordinator for the same backend, sharing this cache's fill epochs.
    pub fn invalidator(&self) -> InvalidationCoordinator {
        InvalidationCoordinator::new(self.backend.clone(), &self.config, self.epochs.clone())
    }

    pub async fn lookup_post(&self, id: PostId) -> CacheLookup<PostView> {
        self.lookup(CacheKey::Post(id)).await
    }

    /// Taken before the store is read; `fill_post` refuses to keep a view
    /// if the post was invalidated after this point.
    pub fn fill_ticket(&self, id: PostId) -> FillTicket {
        self.epochs.ticket(id)
    }

    pub async fn fill_post(
        &self,
        ticket: FillTicket,
        view: &PostView,
    ) -> Result<FillOutcome, CacheError> {
        if !self.epochs.is_current(ticket) {
            return Ok(self.superseded(ticket));
        }
        let key = CacheKey::Post(ticket.post_id());
        self.store(key, view, self.config.post_ttl()).await?;

        // An invalidation that began between the check and the write may
        // already have deleted the key; take the fresh entry back out.
        if !self.epochs.is_current(ticket) {
            if let Err(err) = self.backend.delete(&key.render()).await {
                warn!(
                    target = SOURCE,
                    cache_key = %key.render(),
                    error = %err,
                    "Could not withdraw superseded fill; entry lives until TTL"
                );
                return Err(err);
            }
            return Ok(self.superseded(ticket));
        }
        Ok(FillOutcome::Stored)
    }

    fn superseded(&self, ticket: FillTicket) -> FillOutcome {
        counter!(METRIC_FILL_SUPERSEDED).increment(1);
        debug!(
            target = SOURCE,
            post_id = %ticket.post_id(),
            "Post invalidated during fill; not caching"
        );
        FillOutcome::Superseded
    }

    pub async fn lookup_most_liked(&self) -> CacheLookup<Vec<PostView>> {
        self.lookup(CacheKey::MostLiked).await
    }

    pub async fn store_most_liked(&self, ranking: &[PostView]) -> Result<(), CacheError> {
        self.store(CacheKey::MostLiked, &ranking, self.config.most_liked_ttl())
            .await
    }

    async fn lookup<T: DeserializeOwned>(&self, key: CacheKey) -> CacheLookup<T> {
        let rendered = key.render();
        match self.backend.get(&rendered).await {
            Ok(Some(bytes)) => match serde_json::from_slice::<T>(&bytes) {
                Ok(value) => {
                    counter!(METRIC_HIT, "kind" => key.kind()).increment(1);
                    CacheLookup::Hit(value)
                }
                Err(err) => {
                    counter!(METRIC_CORRUPT, "kind" => key.kind()).increment(1);
                    warn!(
                        target = SOURCE,
                        cache_key = %rendered,
                        error = %err,
                        "Cached value failed to decode; treating as miss"
                    );
                    CacheLookup::Miss
                }
            },
            Ok(None) => {
                counter!(METRIC_MISS, "kind" => key.kind()).increment(1);
                debug!(target = SOURCE, cache_key = %rendered, "Cache miss");
                CacheLookup::Miss
            }
            Err(err) => {
                counter!(METRIC_UNAVAILABLE, "op" => "get").increment(1);
                warn!(
                    target = SOURCE,
                    cache_key = %rendered,
                    error = %err,
                    "Cache unavailable on read; falling back to store"
                );
                CacheLookup::Unavailable
            }
        }
    }

    async fn store<T: Serialize + ?Sized>(
        &self,
        key: CacheKey,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let payload = Bytes::from(serde_json::to_vec(value)?);
        let rendered = key.render();
        self.backend
            .set(&rendered, payload, ttl)
            .await
            .inspect_err(|_| {
                counter!(METRIC_UNAVAILABLE, "op" => "set").increment(1);
            })?;
        debug!(
            target = SOURCE,
            cache_key = %rendered,
            ttl_secs = ttl.as_secs(),
            "Cache entry stored"
        );
        Ok(())
    }
}

//! Write-path cache invalidation.
//!
//! Every post mutation calls [`InvalidationCoordinator::invalidate_post`] after
//! its store write commits. A missing entry is a normal outcome; a transport
//! failure is retried a bounded number of times and then returned so the caller
//! can fail the mutation.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, error, instrument, warn};

use crate::domain::types::PostId;

use super::config::CacheConfig;
use super::epochs::FillEpochs;
use super::keys::CacheKey;
use super::store::{Cache, CacheError};

const SOURCE: &str = "cache::coordinator";
const METRIC_INVALIDATION: &str = "picshare_invalidation_total";
const METRIC_INVALIDATION_RETRY: &str = "picshare_invalidation_retry_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationOutcome {
    /// An entry existed and was deleted.
    Removed,
    /// Nothing was cached for the post (never read, or already expired).
    NothingCached,
}

impl InvalidationOutcome {
    fn as_label(self) -> &'static str {
        match self {
            InvalidationOutcome::Removed => "removed",
            InvalidationOutcome::NothingCached => "absent",
        }
    }
}

#[derive(Clone)]
pub struct InvalidationCoordinator {
    cache: Arc<dyn Cache>,
    epochs: Arc<FillEpochs>,
    attempts: u32,
    backoff: Duration,
    attempt_timeout: Duration,
}

impl InvalidationCoordinator {
    /// Built through [`PostCache::invalidator`](super::PostCache::invalidator)
    /// so both sides agree on the fill epochs.
    pub(crate) fn new(
        cache: Arc<dyn Cache>,
        config: &CacheConfig,
        epochs: Arc<FillEpochs>,
    ) -> Self {
        Self {
            cache,
            epochs,
            attempts: config.invalidation_attempts(),
            backoff: config.invalidation_backoff(),
            attempt_timeout: config.invalidation_timeout(),
        }
    }

    /// Remove the cached view of `post_id`.
    #[instrument(skip_all, fields(post_id = %post_id))]
    pub async fn invalidate_post(
        &self,
        post_id: PostId,
    ) -> Result<InvalidationOutcome, CacheError> {
        let key = CacheKey::Post(post_id).render();
        // Fills that read the store before this point must not be cached.
        self.epochs.bump(post_id);
        let mut attempt = 1;
        loop {
            match self.delete_once(&key).await {
                Ok(outcome) => {
                    counter!(METRIC_INVALIDATION, "outcome" => outcome.as_label()).increment(1);
                    if outcome == InvalidationOutcome::NothingCached {
                        debug!(
                            target = SOURCE,
                            cache_key = %key,
                            "Nothing cached to invalidate"
                        );
                    }
                    return Ok(outcome);
                }
                Err(err) if attempt < self.attempts => {
                    counter!(METRIC_INVALIDATION_RETRY).increment(1);
                    warn!(
                        target = SOURCE,
                        cache_key = %key,
                        attempt,
                        max_attempts = self.attempts,
                        error = %err,
                        "Cache invalidation failed; retrying"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    counter!(METRIC_INVALIDATION, "outcome" => "failed").increment(1);
                    error!(
                        target = SOURCE,
                        cache_key = %key,
                        attempts = attempt,
                        error = %err,
                        "Cache invalidation failed; stale reads possible until TTL expiry"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn delete_once(&self, key: &str) -> Result<InvalidationOutcome, CacheError> {
        let deleted = tokio::time::timeout(self.attempt_timeout, self.cache.delete(key))
            .await
            .map_err(|_| CacheError::Timeout {
                op: "delete",
                elapsed: self.attempt_timeout,
            })??;
        Ok(if deleted {
            InvalidationOutcome::Removed
        } else {
            InvalidationOutcome::NothingCached
        })
    }
}

use std::time::Duration;

use thiserror::Error;

use crate::application::repos::RepoError;
use crate::cache::{CacheError, InvalidationOutcome};
use crate::domain::error::DomainError;
use crate::domain::posts::LikeOutcome;
use crate::domain::types::PostId;
use crate::events::PublishHandle;

#[derive(Debug, Error)]
pub enum PostServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    /// The write committed but the cached view may still be served.
    #[error("post {post_id} was updated but its cached view could not be invalidated")]
    InvalidationFailed {
        post_id: PostId,
        #[source]
        source: CacheError,
    },
    #[error("operation exceeded its {0:?} deadline")]
    Timeout(Duration),
}

/// What a successful like did.
#[derive(Debug)]
pub struct LikeReceipt {
    pub outcome: LikeOutcome,
    pub invalidation: InvalidationOutcome,
    /// Present only when a new like was stored and an event was sent.
    pub publish: Option<PublishHandle>,
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::application::blobs::BlobLinker;
use crate::application::repos::{PostsRepo, PostsWriteRepo};
use crate::cache::{InvalidationCoordinator, InvalidationOutcome, PostCache};
use crate::domain::error::DomainError;
use crate::domain::types::{PostId, UserId};
use crate::events::LikePublisher;

use super::types::PostServiceError;

pub struct PostServiceDeps {
    pub reader: Arc<dyn PostsRepo>,
    pub writer: Arc<dyn PostsWriteRepo>,
    pub blobs: Arc<dyn BlobLinker>,
    /// Also supplies the invalidation coordinator.
    pub cache: PostCache,
    pub publisher: LikePublisher,
    /// Bound on the read phase of queries and the check-and-write phase of
    /// mutations.
    pub deadline: Duration,
}

#[derive(Clone)]
pub struct PostService {
    pub(super) reader: Arc<dyn PostsRepo>,
    pub(super) writer: Arc<dyn PostsWriteRepo>,
    pub(super) blobs: Arc<dyn BlobLinker>,
    pub(super) cache: PostCache,
    pub(super) invalidator: InvalidationCoordinator,
    pub(super) publisher: LikePublisher,
    pub(super) deadline: Duration,
}

impl PostService {
    pub fn new(deps: PostServiceDeps) -> Self {
        Self {
            reader: deps.reader,
            writer: deps.writer,
            blobs: deps.blobs,
            invalidator: deps.cache.invalidator(),
            cache: deps.cache,
            publisher: deps.publisher,
            deadline: deps.deadline,
        }
    }

    pub(super) async fn within<T, F>(&self, work: F) -> Result<T, PostServiceError>
    where
        F: Future<Output = Result<T, PostServiceError>>,
    {
        tokio::time::timeout(self.deadline, work)
            .await
            .map_err(|_| PostServiceError::Timeout(self.deadline))?
    }

    /// Rejects the request before anything is written when `actor` does not
    /// own the post.
    pub(super) async fn ensure_owner(
        &self,
        post_id: PostId,
        actor: UserId,
    ) -> Result<(), PostServiceError> {
        let owner = self
            .reader
            .find_post_owner(post_id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;
        if owner != actor {
            return Err(DomainError::forbidden(format!(
                "user {actor} does not own post {post_id}"
            ))
            .into());
        }
        Ok(())
    }

    /// Runs after a committed write and is not subject to the request deadline.
    pub(super) async fn invalidate(
        &self,
        post_id: PostId,
    ) -> Result<InvalidationOutcome, PostServiceError> {
        self.invalidator
            .invalidate_post(post_id)
            .await
            .map_err(|source| PostServiceError::InvalidationFailed { post_id, source })
    }
}

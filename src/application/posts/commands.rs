use tracing::{info, instrument};

use crate::application::repos::RepoError;
use crate::cache::InvalidationOutcome;
use crate::domain::error::DomainError;
use crate::domain::events::LikeEvent;
use crate::domain::posts::PostName;
use crate::domain::types::{PostId, UserId};

use super::service::PostService;
use super::types::{LikeReceipt, PostServiceError};

const SOURCE: &str = "application::posts";

impl PostService {
    #[instrument(skip(self, name))]
    pub async fn create_post(&self, actor: UserId, name: &str) -> Result<PostId, PostServiceError> {
        let name = PostName::parse(name)?;
        let post_id = self
            .within(async { Ok(self.writer.create_post(actor, &name).await?) })
            .await?;
        info!(target = SOURCE, post_id = %post_id, owner = %actor, "post created");
        Ok(post_id)
    }

    #[instrument(skip(self))]
    pub async fn append_image(
        &self,
        actor: UserId,
        post_id: PostId,
        storage_key: &str,
    ) -> Result<InvalidationOutcome, PostServiceError> {
        let storage_key = storage_key.trim();
        if storage_key.is_empty() {
            return Err(DomainError::validation("storage key must not be empty").into());
        }

        self.within(async {
            self.ensure_owner(post_id, actor).await?;
            self.writer
                .append_image(post_id, storage_key)
                .await
                .map_err(|err| match err {
                    RepoError::InvalidInput { message } => {
                        PostServiceError::Domain(DomainError::validation(message))
                    }
                    other => other.into(),
                })
        })
        .await?;

        let outcome = self.invalidate(post_id).await?;
        info!(target = SOURCE, post_id = %post_id, storage_key, "image attached");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn delete_image(
        &self,
        actor: UserId,
        post_id: PostId,
        storage_key: &str,
    ) -> Result<InvalidationOutcome, PostServiceError> {
        let removed = self
            .within(async {
                self.ensure_owner(post_id, actor).await?;
                self.writer
                    .remove_image(post_id, storage_key)
                    .await
                    .map_err(|err| not_found_as(err, "image"))
            })
            .await;
        self.settle_delete(post_id, removed).await?;

        let outcome = self.invalidate(post_id).await?;
        info!(target = SOURCE, post_id = %post_id, storage_key, "image detached");
        Ok(outcome)
    }

    #[instrument(skip(self))]
    pub async fn delete_post(
        &self,
        actor: UserId,
        post_id: PostId,
    ) -> Result<InvalidationOutcome, PostServiceError> {
        let deleted = self
            .within(async {
                self.ensure_owner(post_id, actor).await?;
                self.writer
                    .delete_post(post_id)
                    .await
                    .map_err(|err| not_found_as(err, "post"))
            })
            .await;
        self.settle_delete(post_id, deleted).await?;

        let outcome = self.invalidate(post_id).await?;
        info!(target = SOURCE, post_id = %post_id, "post deleted");
        Ok(outcome)
    }

    /// Stores the like, invalidates the post, and announces a new like. A
    /// repeated like changes nothing and announces nothing, but still
    /// invalidates so a retry after a failed invalidation can succeed.
    #[instrument(skip(self))]
    pub async fn like_post(
        &self,
        actor: UserId,
        post_id: PostId,
    ) -> Result<LikeReceipt, PostServiceError> {
        let (owner, outcome) = self
            .within(async {
                let owner = self
                    .reader
                    .find_post_owner(post_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("post"))?;
                let outcome = self
                    .writer
                    .like_post(post_id, actor)
                    .await
                    .map_err(|err| not_found_as(err, "post"))?;
                Ok((owner, outcome))
            })
            .await?;

        let invalidation = self.invalidate(post_id).await;

        let publish = outcome
            .is_created()
            .then(|| self.publisher.publish(LikeEvent::new(post_id, actor, owner)));

        let invalidation = invalidation?;
        info!(
            target = SOURCE,
            post_id = %post_id,
            liker = %actor,
            created = outcome.is_created(),
            "post liked"
        );
        Ok(LikeReceipt {
            outcome,
            invalidation,
            publish,
        })
    }
}

impl PostService {
    /// A delete that finds nothing to remove may be the retry of one whose
    /// invalidation failed, so the post's entry is cleared before the miss
    /// is reported.
    async fn settle_delete(
        &self,
        post_id: PostId,
        written: Result<(), PostServiceError>,
    ) -> Result<(), PostServiceError> {
        match written {
            Err(err @ PostServiceError::Domain(DomainError::NotFound { .. })) => {
                self.invalidate(post_id).await?;
                Err(err)
            }
            other => other,
        }
    }
}

fn not_found_as(err: RepoError, entity: &'static str) -> PostServiceError {
    match err {
        RepoError::NotFound => DomainError::not_found(entity).into(),
        other => other.into(),
    }
}

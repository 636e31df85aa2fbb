//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::notifications::{NewNotification, NotificationRecord};
use crate::domain::posts::{LikeOutcome, PostName, PostRecord};
use crate::domain::types::{PostId, UserId};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn find_post(&self, id: PostId) -> Result<Option<PostRecord>, RepoError>;

    async fn find_post_owner(&self, id: PostId) -> Result<Option<UserId>, RepoError>;

    /// Post ids owned by `owner`, ascending.
    async fn list_user_post_ids(&self, owner: UserId) -> Result<Vec<PostId>, RepoError>;

    /// Posts ordered by like count descending, then id ascending.
    async fn most_liked_posts(&self, limit: u32) -> Result<Vec<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, owner: UserId, name: &PostName) -> Result<PostId, RepoError>;

    /// Attach an uploaded image. `InvalidInput` when no image has this key.
    async fn append_image(&self, id: PostId, storage_key: &str) -> Result<(), RepoError>;

    /// Detach an image. `NotFound` when it was not attached.
    async fn remove_image(&self, id: PostId, storage_key: &str) -> Result<(), RepoError>;

    async fn delete_post(&self, id: PostId) -> Result<(), RepoError>;

    async fn like_post(&self, id: PostId, liker: UserId) -> Result<LikeOutcome, RepoError>;
}

#[async_trait]
pub trait NotificationsRepo: Send + Sync {
    async fn record_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<NotificationRecord, RepoError>;

    /// Newest first.
    async fn list_notifications(&self, liked: UserId)
    -> Result<Vec<NotificationRecord>, RepoError>;
}

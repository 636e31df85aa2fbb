use async_trait::async_trait;

use crate::application::repos::{PostsWriteRepo, RepoError};
use crate::domain::posts::{LikeOutcome, PostName};
use crate::domain::types::{PostId, UserId};
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, owner: UserId, name: &PostName) -> Result<PostId, RepoError> {
        sqlx::query_scalar::<_, PostId>(
            "INSERT INTO posts (user_id, name) VALUES ($1, $2) RETURNING id",
        )
        .bind(owner)
        .bind(name.as_str())
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn append_image(&self, id: PostId, storage_key: &str) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let image_id = sqlx::query_scalar::<_, i64>("SELECT id FROM images WHERE storage_key = $1")
            .bind(storage_key)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| RepoError::invalid_input(format!("no image stored as `{storage_key}`")))?;

        sqlx::query(
            "INSERT INTO post_images (post_id, image_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(image_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)
    }

    async fn remove_image(&self, id: PostId, storage_key: &str) -> Result<(), RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM post_images pi
            USING images i
            WHERE pi.image_id = i.id AND pi.post_id = $1 AND i.storage_key = $2
            "#,
        )
        .bind(id)
        .bind(storage_key)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn delete_post(&self, id: PostId) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn like_post(&self, id: PostId, liker: UserId) -> Result<LikeOutcome, RepoError> {
        let result = sqlx::query(
            "INSERT INTO likes (post_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(liker)
        .execute(self.pool())
        .await
        .map_err(|err| match map_sqlx_error(err) {
            RepoError::InvalidInput { .. } => RepoError::NotFound,
            other => other,
        })?;

        Ok(if result.rows_affected() == 1 {
            LikeOutcome::Created
        } else {
            LikeOutcome::AlreadyLiked
        })
    }
}

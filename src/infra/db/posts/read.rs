use async_trait::async_trait;

use crate::application::repos::{PostsRepo, RepoError};
use crate::domain::posts::PostRecord;
use crate::domain::types::{PostId, UserId};
use crate::infra::db::map_sqlx_error;

use super::PostgresRepositories;
use super::types::{POST_PROJECTION, PostRow};

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn find_post(&self, id: PostId) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("{POST_PROJECTION} WHERE p.id = $1");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn find_post_owner(&self, id: PostId) -> Result<Option<UserId>, RepoError> {
        sqlx::query_scalar::<_, UserId>("SELECT user_id FROM posts WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn list_user_post_ids(&self, owner: UserId) -> Result<Vec<PostId>, RepoError> {
        sqlx::query_scalar::<_, PostId>("SELECT id FROM posts WHERE user_id = $1 ORDER BY id")
            .bind(owner)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn most_liked_posts(&self, limit: u32) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!("{POST_PROJECTION} ORDER BY like_count DESC, p.id ASC LIMIT $1");
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(i64::from(limit))
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }
}

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{NotificationsRepo, RepoError};
use crate::domain::notifications::{NewNotification, NotificationRecord};
use crate::domain::types::{PostId, UserId};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: i64,
    post_id: PostId,
    liker_id: UserId,
    liked_id: UserId,
    created_at: OffsetDateTime,
}

impl From<NotificationRow> for NotificationRecord {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            liker_id: row.liker_id,
            liked_id: row.liked_id,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl NotificationsRepo for PostgresRepositories {
    async fn record_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<NotificationRecord, RepoError> {
        sqlx::query_as::<_, NotificationRow>(
            r#"
            INSERT INTO like_notifications (post_id, liker_id, liked_id)
            VALUES ($1, $2, $3)
            RETURNING id, post_id, liker_id, liked_id, created_at
            "#,
        )
        .bind(notification.post_id)
        .bind(notification.liker_id)
        .bind(notification.liked_id)
        .fetch_one(self.pool())
        .await
        .map(NotificationRecord::from)
        .map_err(map_sqlx_error)
    }

    async fn list_notifications(
        &self,
        liked: UserId,
    ) -> Result<Vec<NotificationRecord>, RepoError> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, post_id, liker_id, liked_id, created_at
            FROM like_notifications
            WHERE liked_id = $1
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(liked)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(NotificationRecord::from).collect())
    }
}

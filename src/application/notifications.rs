//! Notification service: records likes as notifications and lists them per user.

use std::sync::Arc;

use picshare_api_types::{NotificationView, NotificationsResponse};
use time::format_description::well_known::Rfc3339;
use tracing::{debug, instrument};

use crate::application::repos::{NotificationsRepo, RepoError};
use crate::domain::events::LikeEvent;
use crate::domain::notifications::{NewNotification, NotificationRecord};
use crate::domain::types::UserId;

#[derive(Clone)]
pub struct NotificationService {
    repo: Arc<dyn NotificationsRepo>,
}

impl NotificationService {
    pub fn new(repo: Arc<dyn NotificationsRepo>) -> Self {
        Self { repo }
    }

    #[instrument(skip_all, fields(post_id = %event.post_id, liker_id = %event.liker_id))]
    pub async fn record(&self, event: &LikeEvent) -> Result<NotificationRecord, RepoError> {
        let record = self
            .repo
            .record_notification(&NewNotification::from(event))
            .await?;
        debug!(
            target = "application::notifications",
            notification_id = record.id,
            liked_id = %record.liked_id,
            "notification recorded"
        );
        Ok(record)
    }

    pub async fn list_for_user(&self, user: UserId) -> Result<NotificationsResponse, RepoError> {
        let records = self.repo.list_notifications(user).await?;
        Ok(NotificationsResponse {
            user_id: user.get(),
            notifications: records.iter().map(to_view).collect(),
        })
    }
}

fn to_view(record: &NotificationRecord) -> NotificationView {
    NotificationView {
        post_id: record.post_id.get(),
        liker_id: record.liker_id.get(),
        created_at: record
            .created_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| record.created_at.unix_timestamp().to_string()),
        message: record.message(),
    }
}

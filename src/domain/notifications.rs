//! Like notifications as recorded by the notification service.

use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

use super::events::LikeEvent;
use super::types::{PostId, UserId};

pub const NOTIFICATION_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[day]-[month]-[year] [hour]:[minute]");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewNotification {
    pub post_id: PostId,
    pub liker_id: UserId,
    pub liked_id: UserId,
}

impl From<&LikeEvent> for NewNotification {
    fn from(event: &LikeEvent) -> Self {
        Self {
            post_id: event.post_id,
            liker_id: event.liker_id,
            liked_id: event.liked_owner_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: i64,
    pub post_id: PostId,
    pub liker_id: UserId,
    pub liked_id: UserId,
    pub created_at: OffsetDateTime,
}

impl NotificationRecord {
    /// Human-readable line shown to the liked user, timestamp in UTC.
    pub fn message(&self) -> String {
        let at = self
            .created_at
            .to_offset(time::UtcOffset::UTC)
            .format(NOTIFICATION_TIME_FORMAT)
            .unwrap_or_else(|_| self.created_at.unix_timestamp().to_string());
        format!(
            "User {} liked your post number {} at {}",
            self.liker_id, self.post_id, at
        )
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn message_uses_day_month_year() {
        let record = NotificationRecord {
            id: 1,
            post_id: PostId::new(7),
            liker_id: UserId::new(3),
            liked_id: UserId::new(9),
            created_at: datetime!(2024-03-05 08:04 UTC),
        };
        insta::assert_snapshot!(
            record.message(),
            @"User 3 liked your post number 7 at 05-03-2024 08:04"
        );
    }

    #[test]
    fn message_normalises_to_utc() {
        let record = NotificationRecord {
            id: 1,
            post_id: PostId::new(1),
            liker_id: UserId::new(2),
            liked_id: UserId::new(3),
            created_at: datetime!(2024-03-05 01:30 +02:00),
        };
        assert!(record.message().ends_with("04-03-2024 23:30"));
    }
}

//! The "post liked" domain event and its wire encoding.

use bytes::Bytes;
use picshare_api_types::LikeMessage;
use thiserror::Error;

use super::types::{PostId, UserId};

/// Emitted once per newly created like. Immutable after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeEvent {
    pub post_id: PostId,
    pub liker_id: UserId,
    pub liked_owner_id: UserId,
}

#[derive(Debug, Error)]
#[error("malformed like event: {reason}")]
pub struct MalformedEvent {
    pub reason: String,
}

impl LikeEvent {
    pub fn new(post_id: PostId, liker_id: UserId, liked_owner_id: UserId) -> Self {
        Self {
            post_id,
            liker_id,
            liked_owner_id,
        }
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(&LikeMessage::from(*self)).map(Bytes::from)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, MalformedEvent> {
        serde_json::from_slice::<LikeMessage>(payload)
            .map(Self::from)
            .map_err(|err| MalformedEvent {
                reason: err.to_string(),
            })
    }
}

impl From<LikeEvent> for LikeMessage {
    fn from(event: LikeEvent) -> Self {
        LikeMessage {
            post_id: event.post_id.get(),
            liker: event.liker_id.get(),
            liked: event.liked_owner_id.get(),
        }
    }
}

impl From<LikeMessage> for LikeEvent {
    fn from(message: LikeMessage) -> Self {
        LikeEvent {
            post_id: PostId::new(message.post_id),
            liker_id: UserId::new(message.liker),
            liked_owner_id: UserId::new(message.liked),
        }
    }
}

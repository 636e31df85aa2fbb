//! Request and response shapes shared by the picshare services and their clients.
//!
//! Image maps use `BTreeMap` so a serialized view is byte-stable: the same post
//! state always produces the same JSON document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Read model of a single post with its image URLs already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostView {
    pub name: String,
    /// Storage key to retrieval URL.
    pub images: BTreeMap<String, String>,
    #[serde(rename = "likes_count")]
    pub like_count: i64,
}

impl PostView {
    pub fn image_url(&self, storage_key: &str) -> Option<&str> {
        self.images.get(storage_key).map(String::as_str)
    }
}

/// A post as listed under its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPostEntry {
    pub id: i64,
    #[serde(flatten)]
    pub post: PostView,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPostsResponse {
    pub user_id: i64,
    pub posts: Vec<UserPostEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MostLikedResponse {
    pub posts: Vec<PostView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostRequest {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePostResponse {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendImageRequest {
    pub storage_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResponse {
    pub post_id: i64,
    /// False when the caller had already liked the post.
    pub created: bool,
}

/// Body of a "post liked" message on the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeMessage {
    pub post_id: i64,
    pub liker: i64,
    pub liked: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationView {
    pub post_id: i64,
    pub liker_id: i64,
    /// RFC 3339, UTC.
    pub created_at: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationsResponse {
    pub user_id: i64,
    pub notifications: Vec<NotificationView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_message_uses_short_field_names() {
        let message = LikeMessage {
            post_id: 7,
            liker: 3,
            liked: 9,
        };
        let json = serde_json::to_string(&message).expect("serialize");
        assert_eq!(json, r#"{"post_id":7,"liker":3,"liked":9}"#);
    }

    #[test]
    fn post_view_serializes_images_in_key_order() {
        let mut images = BTreeMap::new();
        images.insert("b.png".to_string(), "https://cdn/b".to_string());
        images.insert("a.png".to_string(), "https://cdn/a".to_string());
        let view = PostView {
            name: "trip".to_string(),
            images,
            like_count: 2,
        };

        let json = serde_json::to_string(&view).expect("serialize");
        assert_eq!(
            json,
            r#"{"name":"trip","images":{"a.png":"https://cdn/a","b.png":"https://cdn/b"},"likes_count":2}"#
        );
    }

    #[test]
    fn user_post_entry_flattens_view() {
        let entry = UserPostEntry {
            id: 4,
            post: PostView {
                name: "x".to_string(),
                images: BTreeMap::new(),
                like_count: 0,
            },
        };
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value["id"], 4);
        assert_eq!(value["likes_count"], 0);
    }
}

use crate::domain::posts::PostRecord;
use crate::domain::types::PostId;

#[derive(sqlx::FromRow)]
pub(crate) struct PostRow {
    pub(crate) id: PostId,
    pub(crate) name: String,
    pub(crate) image_keys: Vec<String>,
    pub(crate) like_count: i64,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            image_keys: row.image_keys,
            like_count: row.like_count,
        }
    }
}

/// Shared projection: one post with its sorted image keys and like count.
pub(crate) const POST_PROJECTION: &str = r#"
    SELECT p.id,
           p.name,
           ARRAY(
               SELECT i.storage_key
               FROM post_images pi
               INNER JOIN images i ON i.id = pi.image_id
               WHERE pi.post_id = p.id
               ORDER BY i.storage_key
           ) AS image_keys,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count
    FROM posts p
"#;

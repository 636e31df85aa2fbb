//! Cache key definitions.

use std::fmt;

use crate::domain::types::PostId;

const MOST_LIKED_KEY: &str = "MostLikedPosts";

/// Deterministic key for a cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// A single post view, keyed by the decimal post id.
    Post(PostId),
    /// The most-liked ranking.
    MostLiked,
}

impl CacheKey {
    pub fn render(&self) -> String {
        self.to_string()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CacheKey::Post(_) => "post",
            CacheKey::MostLiked => "most_liked",
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Post(id) => write!(f, "{}", id.get()),
            CacheKey::MostLiked => f.write_str(MOST_LIKED_KEY),
        }
    }
}

//! Post records as the store returns them and the rules for naming posts.

use super::error::DomainError;
use super::types::PostId;

pub const MAX_POST_NAME_CHARS: usize = 30;

/// A validated post name: non-blank and at most [`MAX_POST_NAME_CHARS`] characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostName(String);

impl PostName {
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(DomainError::validation("post name must not be empty"));
        }
        let chars = raw.chars().count();
        if chars > MAX_POST_NAME_CHARS {
            return Err(DomainError::validation(format!(
                "post name is {chars} characters, the limit is {MAX_POST_NAME_CHARS}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Persisted post state before image keys are turned into URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostRecord {
    pub id: PostId,
    pub name: String,
    /// Sorted, unique storage keys.
    pub image_keys: Vec<String>,
    pub like_count: i64,
}

/// Result of an idempotent like write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Created,
    AlreadyLiked,
}

impl LikeOutcome {
    pub fn is_created(self) -> bool {
        matches!(self, LikeOutcome::Created)
    }
}

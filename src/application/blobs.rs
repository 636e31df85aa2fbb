//! Port for turning stored object keys into retrieval URLs.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("storage key must not be empty")]
    EmptyKey,
    #[error("object `{key}` could not be linked: {message}")]
    Unavailable { key: String, message: String },
}

#[async_trait]
pub trait BlobLinker: Send + Sync {
    /// Short-lived URL for `storage_key`.
    async fn resolve_url(&self, storage_key: &str) -> Result<String, BlobError>;
}

//! Post reads and mutations over the store, the post cache, and the like
//! publisher.
//!
//! Reads are cache-aside and fall back to the store whenever the cache misses
//! or is unreachable. Mutations check ownership, write, then invalidate; a
//! failed invalidation fails the call even though the write is kept.

mod commands;
mod queries;
mod service;
mod types;

pub use service::{PostService, PostServiceDeps};
pub use types::{LikeReceipt, PostServiceError};

//! Post cache.
//!
//! - [`PostCache`]: typed cache-aside access for single post views and the
//!   most-liked ranking, over any [`Cache`] backend.
//! - [`InvalidationCoordinator`]: deletes a post's entry after each mutation.
//!   Obtained from [`PostCache::invalidator`] so a fill that raced an
//!   invalidation is never left in the cache.
//! - Backends: [`RedisCache`] for deployments, [`MemoryCache`] for tests and
//!   single-node runs.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! post_ttl_seconds = 18000
//! most_liked_ttl_seconds = 1800
//! ```
//!
//! The ranking is never invalidated by likes; it is at most
//! `most_liked_ttl_seconds` stale.

mod config;
mod coordinator;
mod epochs;
mod keys;
mod lock;
mod memory;
mod redis_store;
mod store;

pub use config::CacheConfig;
pub use coordinator::{InvalidationCoordinator, InvalidationOutcome};
pub use epochs::FillTicket;
pub use keys::CacheKey;
pub use memory::MemoryCache;
pub use redis_store::RedisCache;
pub use store::{Cache, CacheError, CacheLookup, FillOutcome, PostCache};

pub(crate) use lock::mutex_lock;

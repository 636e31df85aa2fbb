//! Picshare core: cache-aside post reads, mutation-driven cache invalidation and
//! the like-notification pipeline, with the HTTP surfaces and storage adapters
//! that host them.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod events;
pub mod infra;

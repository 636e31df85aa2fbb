//! Application services: post reads and writes, notifications, and the ports they use.

pub mod blobs;
pub mod error;
pub mod notifications;
pub mod posts;
pub mod repos;

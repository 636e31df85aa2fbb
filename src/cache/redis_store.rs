//! Redis cache backend: `SET key value EX seconds`, `GET key`, `DEL key`.
//!
//! `ConnectionManager` multiplexes one connection and reconnects on its own, so
//! each call works on a cheap clone instead of a shared lock.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::store::{Cache, CacheError};

#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| CacheError::unavailable("connect", e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::unavailable("connect", e))?;
        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::unavailable("ping", e))?;
        Ok(())
    }
}

/// Redis expiry is whole seconds; round up so a sub-second TTL still expires.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 || secs == 0 {
        secs + 1
    } else {
        secs
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::unavailable("get", e))?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(key, value.as_ref(), ttl_seconds(ttl))
            .await
            .map_err(|e| CacheError::unavailable("set", e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let removed: u64 = conn
            .del(key)
            .await
            .map_err(|e| CacheError::unavailable("delete", e))?;
        Ok(removed > 0)
    }
}

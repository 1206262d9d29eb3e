//! Redis-backed shared cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use tracing::debug;

use crate::cache::SharedCache;
use crate::error::CacheError;

/// [`SharedCache`] over a Redis server.
///
/// `set_if_absent` maps to `SET key value NX PX ttl`, which Redis executes
/// atomically.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1:6379/`).
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        debug!("Connected to redis at {}", url);
        Ok(Self { conn })
    }

    fn ttl_millis(key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Err(CacheError::InvalidTtl(key.to_string()));
        }
        Ok(millis)
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, CacheError> {
        let millis = Self::ttl_millis(key, ttl)?;
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let millis = Self::ttl_millis(key, ttl)?;
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(millis)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}

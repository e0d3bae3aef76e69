//! Redis-backed transient store for multi-process coordination.
//!
//! Expiry is delegated to Redis; hash increments run in a MULTI/EXEC
//! pipeline so the returned snapshot reflects this caller's update.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{CacheError, CacheResult, TransientStore};

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Unavailable(e.to_string())
    }
}

/// Redis-backed transient store.
#[derive(Clone)]
pub struct RedisTransientStore {
    conn: ConnectionManager,
}

impl RedisTransientStore {
    /// Connect to Redis, e.g. `redis://localhost:6379`.
    pub async fn new(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::Unavailable(format!("Redis connection error: {}", e)))?;

        let conn = ConnectionManager::new(client).await.map_err(|e| {
            CacheError::Unavailable(format!("Redis connection manager error: {}", e))
        })?;

        Ok(Self { conn })
    }
}

/// Redis rejects EX 0; round sub-second TTLs up.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl TransientStore for RedisTransientStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs(ttl))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn hash_increment(
        &self,
        key: &str,
        deltas: &[(&str, i64)],
        ttl: Duration,
    ) -> CacheResult<HashMap<String, i64>> {
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (field, delta) in deltas {
            pipe.hincr(key, *field, *delta).ignore();
        }
        pipe.expire(key, ttl_secs(ttl) as i64).ignore();
        pipe.hgetall(key);

        let (fields,): (HashMap<String, i64>,) = pipe.query_async(&mut conn).await?;
        Ok(fields)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

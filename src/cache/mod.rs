//! Transient key-value storage with expiry.
//!
//! Holds advisory state that may vanish at any time: per-user progress
//! snapshots and the counters of chunked runs. In-memory is the default;
//! Redis shares the state across processes.

mod memory;
#[cfg(feature = "redis-backend")]
mod redis;

pub use memory::InMemoryTransientStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisTransientStore;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

/// Result type for transient store operations.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Transient store unavailable: {0}")]
    Unavailable(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Unsupported transient store URL: {0}")]
    UnsupportedUrl(String),
}

/// Key-value store whose entries expire.
///
/// Implementations must be thread-safe; `hash_increment` must be atomic.
#[async_trait]
pub trait TransientStore: Send + Sync {
    /// Overwrite `key` with `value`, expiring after `ttl`.
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Atomically add each delta to a field of the hash at `key`, refresh
    /// its expiry, and return every field after the update.
    async fn hash_increment(
        &self,
        key: &str,
        deltas: &[(&str, i64)],
        ttl: Duration,
    ) -> CacheResult<HashMap<String, i64>>;

    async fn delete(&self, key: &str) -> CacheResult<()>;
}

/// Open a transient store from an optional URL.
///
/// `None` or `memory` selects the in-memory store; `redis://` URLs need the
/// `redis-backend` feature.
pub async fn connect(url: Option<&str>) -> CacheResult<Arc<dyn TransientStore>> {
    match url {
        None | Some("") | Some("memory") => Ok(Arc::new(InMemoryTransientStore::new())),
        #[cfg(feature = "redis-backend")]
        Some(url) if url.starts_with("redis://") || url.starts_with("rediss://") => {
            Ok(Arc::new(RedisTransientStore::new(url).await?))
        }
        Some(other) => Err(CacheError::UnsupportedUrl(other.to_string())),
    }
}

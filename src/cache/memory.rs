//! In-memory transient store for single-process operation.
//!
//! Entries carry an `Instant` deadline and are dropped lazily on access.
//! State is not persisted across restarts.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CacheError, CacheResult, TransientStore};

#[derive(Debug, Clone)]
enum Value {
    Text(String),
    Hash(HashMap<String, i64>),
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// In-memory transient store.
#[derive(Clone, Default)]
pub struct InMemoryTransientStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryTransientStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop expired entries.
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.is_live(now));
        before - entries.len()
    }
}

#[async_trait]
impl TransientStore for InMemoryTransientStore {
    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        self.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: Value::Text(value.to_string()),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => match &entry.value {
                Value::Text(s) => Ok(Some(s.clone())),
                Value::Hash(h) => Ok(Some(serde_json::to_string(h)?)),
            },
            _ => Ok(None),
        }
    }

    async fn hash_increment(
        &self,
        key: &str,
        deltas: &[(&str, i64)],
        ttl: Duration,
    ) -> CacheResult<HashMap<String, i64>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Hash(HashMap::new()),
            expires_at: now + ttl,
        });
        if !entry.is_live(now) {
            entry.value = Value::Hash(HashMap::new());
        }

        let Value::Hash(fields) = &mut entry.value else {
            return Err(CacheError::Unavailable(format!(
                "key '{}' holds a non-hash value",
                key
            )));
        };
        for (field, delta) in deltas {
            *fields.entry((*field).to_string()).or_insert(0) += delta;
        }
        let snapshot = fields.clone();
        entry.expires_at = now + ttl;
        Ok(snapshot)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

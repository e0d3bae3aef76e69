//! In-memory document store for single-process operation.
//!
//! Holds documents in a lock-protected map keyed by `DedupKey`. The map key
//! doubles as the unique constraint, so concurrent chunk workers racing on
//! the same key get exactly one successful insert.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{BulkInsertReport, DocumentStore, RecordFailure, StoreError, StoreResult};
use crate::import::DedupKey;
use crate::models::{CanonicalDocument, Permissions};

/// In-memory document store.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    documents: Arc<RwLock<HashMap<DedupKey, CanonicalDocument>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all stored documents.
    pub async fn all(&self) -> Vec<CanonicalDocument> {
        self.documents.read().await.values().cloned().collect()
    }

    fn insert_locked(
        documents: &mut HashMap<DedupKey, CanonicalDocument>,
        doc: &CanonicalDocument,
    ) -> StoreResult<()> {
        let key = DedupKey::for_document(doc);
        if documents.contains_key(&key) {
            return Err(StoreError::Duplicate(key));
        }
        documents.insert(key, doc.clone());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn existing_keys(&self, keys: &[DedupKey]) -> StoreResult<HashSet<DedupKey>> {
        let documents = self.documents.read().await;
        Ok(keys
            .iter()
            .filter(|k| documents.contains_key(*k))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, docs: &[CanonicalDocument]) -> StoreResult<BulkInsertReport> {
        let mut documents = self.documents.write().await;
        let mut report = BulkInsertReport::default();

        for (index, doc) in docs.iter().enumerate() {
            match Self::insert_locked(&mut documents, doc) {
                Ok(()) => report.inserted += 1,
                Err(error) => report.failures.push(RecordFailure {
                    index,
                    key: DedupKey::for_document(doc),
                    error,
                }),
            }
        }

        Ok(report)
    }

    async fn insert_one(&self, doc: &CanonicalDocument) -> StoreResult<()> {
        let mut documents = self.documents.write().await;
        Self::insert_locked(&mut documents, doc)
    }

    async fn update_permissions(
        &self,
        id: &str,
        permissions: &Permissions,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut documents = self.documents.write().await;
        match documents.values_mut().find(|d| d.id == id) {
            Some(doc) => {
                doc.permissions = permissions.clone();
                doc.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_by_key(&self, key: &DedupKey) -> StoreResult<Option<CanonicalDocument>> {
        Ok(self.documents.read().await.get(key).cloned())
    }

    async fn count(&self) -> StoreResult<u64> {
        Ok(self.documents.read().await.len() as u64)
    }
}

//! Document identity and duplicate filtering.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::SkipReason;
use crate::models::CanonicalDocument;
use crate::repository::DocumentStore;

/// Identity of a document: uppercased filename and lowercased path.
///
/// The same value fills the store's unique `dedup_key` column, so the
/// in-batch pass, the existence query and the store constraint all agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn new(filename: &str, path: &str) -> Self {
        Self(format!(
            "{}|{}",
            filename.trim().to_uppercase(),
            path.trim().to_lowercase()
        ))
    }

    pub fn for_document(doc: &CanonicalDocument) -> Self {
        Self::new(&doc.filename, &doc.file_location.path)
    }

    /// Wrap a key read back from the store's `dedup_key` column.
    pub fn from_stored(raw: String) -> Self {
        Self(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Documents that survived deduplication, plus the reasons for the rest.
#[derive(Debug, Default)]
pub struct DedupResult {
    pub survivors: Vec<CanonicalDocument>,
    pub skipped: Vec<SkipReason>,
}

/// Filters a normalized batch against itself and against the store.
pub struct BatchDeduplicator<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> BatchDeduplicator<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Keep the first occurrence of each key, then drop keys already stored.
    ///
    /// When the existence query fails the store filter is skipped; the
    /// unique constraint still catches duplicates at write time.
    pub async fn dedup(&self, batch: Vec<CanonicalDocument>) -> DedupResult {
        let mut result = DedupResult::default();

        let (unique, in_batch) = collapse_in_batch(batch);
        result.skipped.extend(in_batch);

        if unique.is_empty() {
            return result;
        }

        let keys: Vec<DedupKey> = unique.iter().map(DedupKey::for_document).collect();
        match self.store.existing_keys(&keys).await {
            Ok(existing) if existing.is_empty() => result.survivors = unique,
            Ok(existing) => {
                for (doc, key) in unique.into_iter().zip(keys) {
                    if existing.contains(&key) {
                        tracing::debug!("Skipping {}: already stored", key);
                        result.skipped.push(SkipReason::AlreadyExists { key });
                    } else {
                        result.survivors.push(doc);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Existence check failed for {} records, relying on store constraint: {}",
                    keys.len(),
                    e
                );
                result.survivors = unique;
            }
        }

        result
    }
}

/// First occurrence wins; later ones become `DuplicateInBatch`.
fn collapse_in_batch(batch: Vec<CanonicalDocument>) -> (Vec<CanonicalDocument>, Vec<SkipReason>) {
    let mut seen = HashSet::with_capacity(batch.len());
    let mut unique = Vec::with_capacity(batch.len());
    let mut skipped = Vec::new();

    for doc in batch {
        let key = DedupKey::for_document(&doc);
        if seen.insert(key.clone()) {
            unique.push(doc);
        } else {
            skipped.push(SkipReason::DuplicateInBatch { key });
        }
    }

    (unique, skipped)
}

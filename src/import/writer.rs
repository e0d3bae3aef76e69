//! Bulk insertion with partial-failure tolerance.

use super::{DedupKey, ImportOutcome, SkipReason};
use crate::models::CanonicalDocument;
use crate::repository::{DocumentStore, StoreError};

/// Writes deduplicated documents to the store.
pub struct BulkWriter<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> BulkWriter<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// One unordered bulk insert. If the bulk call itself fails, fall back
    /// to inserting records one at a time.
    pub async fn write(&self, docs: Vec<CanonicalDocument>) -> ImportOutcome {
        let mut outcome = ImportOutcome::new();
        if docs.is_empty() {
            return outcome;
        }

        match self.store.insert_many(&docs).await {
            Ok(report) => {
                outcome.imported += report.inserted;
                if !report.is_complete() {
                    tracing::warn!(
                        "Bulk insert partially failed: {} inserted, {} failed",
                        report.inserted,
                        report.failures.len()
                    );
                }
                for failure in report.failures {
                    outcome.record_skip(skip_for(failure.key, failure.error));
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Bulk insert of {} records failed, inserting one by one: {}",
                    docs.len(),
                    e
                );
                self.write_each(&docs, &mut outcome).await;
            }
        }

        outcome
    }

    async fn write_each(&self, docs: &[CanonicalDocument], outcome: &mut ImportOutcome) {
        for doc in docs {
            match self.store.insert_one(doc).await {
                Ok(()) => outcome.imported += 1,
                Err(e) => outcome.record_skip(skip_for(DedupKey::for_document(doc), e)),
            }
        }
    }
}

/// Unique violations are duplicates, not failures.
fn skip_for(key: DedupKey, error: StoreError) -> SkipReason {
    if error.is_duplicate() {
        SkipReason::AlreadyExists { key }
    } else {
        SkipReason::WriteFailed {
            key,
            message: error.to_string(),
        }
    }
}

//! Persisted document store.
//!
//! The import pipeline talks to storage only through the `DocumentStore`
//! trait. Two implementations ship with the crate: a Diesel/SQLite store for
//! real runs and an in-memory store for tests and dry runs.

pub mod diesel_document;
pub mod diesel_models;
pub mod diesel_notification;
pub mod diesel_pool;
pub mod memory;
pub mod util;

pub use diesel_document::DieselDocumentStore;
pub use diesel_notification::DieselNotificationRepository;
pub use diesel_pool::{AsyncSqlitePool, DieselError};
pub use memory::InMemoryDocumentStore;

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::import::DedupKey;
use crate::models::{CanonicalDocument, Permissions};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the persisted store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The identity key is already taken (unique constraint).
    #[error("Document already exists: {0}")]
    Duplicate(DedupKey),
    /// The store refused this record (data error).
    #[error("Record rejected: {0}")]
    Rejected(String),
    /// The store could not be reached (transport error).
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Whether this error means the record was a duplicate of a stored one.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StoreError::Duplicate(_))
    }
}

/// One record that failed inside a bulk insert.
#[derive(Debug)]
pub struct RecordFailure {
    /// Position in the slice passed to `insert_many`.
    pub index: usize,
    pub key: DedupKey,
    pub error: StoreError,
}

/// Result of an unordered bulk insert that reached the store.
#[derive(Debug, Default)]
pub struct BulkInsertReport {
    pub inserted: usize,
    /// Per-record failures. Order is not guaranteed to match input order.
    pub failures: Vec<RecordFailure>,
}

impl BulkInsertReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Storage for canonical documents.
///
/// Implementations must enforce uniqueness of `DedupKey` so that concurrent
/// writers racing on the same key see exactly one success.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Return the subset of `keys` that is already stored.
    async fn existing_keys(&self, keys: &[DedupKey]) -> StoreResult<HashSet<DedupKey>>;

    /// Insert many documents with unordered semantics: a failing record does
    /// not stop the others. `Err` means the bulk mechanism itself failed and
    /// nothing can be assumed about which records were written.
    async fn insert_many(&self, docs: &[CanonicalDocument]) -> StoreResult<BulkInsertReport>;

    /// Insert a single document.
    async fn insert_one(&self, doc: &CanonicalDocument) -> StoreResult<()>;

    /// Replace the permission descriptor of a document. Returns false if the
    /// document does not exist.
    async fn update_permissions(
        &self,
        id: &str,
        permissions: &Permissions,
        now: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Fetch a document by identity key.
    async fn get_by_key(&self, key: &DedupKey) -> StoreResult<Option<CanonicalDocument>>;

    /// Number of stored documents.
    async fn count(&self) -> StoreResult<u64>;
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_datetime(&s))
}

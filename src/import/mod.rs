//! Bulk document import pipeline.
//!
//! A run reads a delimited file, normalizes each row into a
//! `CanonicalDocument`, drops duplicates (within the batch and against the
//! store), and writes the survivors in bulk. Large files are split into
//! chunks that the worker pool processes independently.
//!
//! Row-level problems never abort a run: they become `SkipReason`s. Only
//! `ImportError` stops the current unit of work.

pub mod dedup;
pub mod dispatch;
pub mod normalizer;
pub mod parser;
pub mod reporter;
pub mod strategy;
pub mod writer;

pub use dedup::{BatchDeduplicator, DedupKey, DedupResult};
pub use dispatch::{new_run_id, ChunkDispatcher, DispatchSummary};
pub use normalizer::normalize;
pub use parser::{ParsedRow, RawRecord, RecordParser};
pub use reporter::{
    progress_key, run_key, ImportReporter, ProgressSnapshot, RunSummary, RunTally, TallyUpdate,
};
pub use strategy::{select_strategy, ImportVariant, Strategy};
pub use writer::BulkWriter;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheError;
use crate::models::Permissions;
use crate::repository::{DocumentStore, StoreError};
use crate::work_queue::WorkQueueError;

/// Fatal errors that abort a unit of work.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(String),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Queue error: {0}")]
    Queue(#[from] WorkQueueError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Why a row did not become a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    ColumnMismatch {
        line: u64,
        expected: usize,
        found: usize,
    },
    MissingField {
        line: u64,
        field: String,
    },
    InvalidValue {
        line: u64,
        field: String,
        value: String,
    },
    Malformed {
        line: u64,
        message: String,
    },
    DuplicateInBatch {
        key: DedupKey,
    },
    AlreadyExists {
        key: DedupKey,
    },
    WriteFailed {
        key: DedupKey,
        message: String,
    },
}

impl SkipReason {
    /// Whether this skip came from bad data or a failed write, as opposed to
    /// a duplicate. Error-driven skips turn a run's outcome into a warning.
    pub fn is_error(&self) -> bool {
        !matches!(
            self,
            SkipReason::DuplicateInBatch { .. } | SkipReason::AlreadyExists { .. }
        )
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ColumnMismatch {
                line,
                expected,
                found,
            } => write!(
                f,
                "line {}: expected {} columns, found {}",
                line, expected, found
            ),
            SkipReason::MissingField { line, field } => {
                write!(f, "line {}: missing required field '{}'", line, field)
            }
            SkipReason::InvalidValue { line, field, value } => {
                write!(f, "line {}: invalid {} '{}'", line, field, value)
            }
            SkipReason::Malformed { line, message } => {
                write!(f, "line {}: malformed row: {}", line, message)
            }
            SkipReason::DuplicateInBatch { key } => write!(f, "{}: duplicate within batch", key),
            SkipReason::AlreadyExists { key } => write!(f, "{}: already exists", key),
            SkipReason::WriteFailed { key, message } => {
                write!(f, "{}: write failed: {}", key, message)
            }
        }
    }
}

/// Run-scoped inputs shared by every row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportContext {
    pub uploader: String,
    pub permissions: Permissions,
    pub now: DateTime<Utc>,
}

impl ImportContext {
    pub fn new(uploader: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            uploader: uploader.into(),
            permissions,
            now: Utc::now(),
        }
    }
}

/// Aggregate result of one run, chunk or batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub skipped: usize,
    /// Skip reasons in the order they were recorded.
    pub reasons: Vec<SkipReason>,
    pub duration: Duration,
}

impl ImportOutcome {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_skip(&mut self, reason: SkipReason) {
        self.skipped += 1;
        self.reasons.push(reason);
    }

    pub fn record_skips(&mut self, reasons: impl IntoIterator<Item = SkipReason>) {
        for reason in reasons {
            self.record_skip(reason);
        }
    }

    /// Fold another outcome into this one (durations are not summed).
    pub fn merge(&mut self, other: ImportOutcome) {
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.reasons.extend(other.reasons);
    }

    pub fn total(&self) -> usize {
        self.imported + self.skipped
    }

    pub fn error_skips(&self) -> usize {
        self.reasons.iter().filter(|r| r.is_error()).count()
    }

    pub fn has_error_skips(&self) -> bool {
        self.reasons.iter().any(SkipReason::is_error)
    }
}

/// Normalize, dedup and write one batch of parsed rows.
///
/// Shared by the direct job and the chunk worker. Rows keep their source
/// order up to the bulk write.
pub async fn process_rows(
    rows: Vec<ParsedRow>,
    ctx: &ImportContext,
    store: &dyn DocumentStore,
) -> ImportOutcome {
    let mut outcome = ImportOutcome::new();
    let mut documents = Vec::with_capacity(rows.len());

    for row in rows {
        match row {
            ParsedRow::Record(raw) => match normalize(&raw, ctx) {
                Ok(doc) => documents.push(doc),
                Err(reason) => {
                    tracing::debug!("Skipping row: {}", reason);
                    outcome.record_skip(reason);
                }
            },
            ParsedRow::Skipped(reason) => outcome.record_skip(reason),
        }
    }

    let deduped = BatchDeduplicator::new(store).dedup(documents).await;
    outcome.record_skips(deduped.skipped);
    outcome.merge(BulkWriter::new(store).write(deduped.survivors).await);
    outcome
}

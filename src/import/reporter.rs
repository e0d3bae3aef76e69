//! Progress snapshots and terminal notifications.
//!
//! Progress is advisory: it lives in the transient store and publishing it
//! never fails a run. The terminal notification is the only user-visible
//! outcome, so each run emits exactly one.
//!
//! Chunked runs aggregate through a `RunTally`: a counter hash shared by the
//! dispatcher and every chunk worker. Whoever makes the final increment
//! (the last chunk, or the dispatcher if all chunks finished first) sees
//! `TallyUpdate::finished` and is responsible for the notification.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ImportError, ImportOutcome};
use crate::cache::{CacheResult, TransientStore};
use crate::models::NotificationType;
use crate::notify::NotificationService;

const KEY_PREFIX: &str = "docimport:";
const JOB_NAME: &str = "Document Import";
/// Skip reasons copied into notification data.
const MAX_REASONS_IN_NOTIFICATION: usize = 10;

pub fn progress_key(user_id: &str) -> String {
    format!("{}progress:{}", KEY_PREFIX, user_id)
}

pub fn run_key(run_id: &str) -> String {
    format!("{}run:{}", KEY_PREFIX, run_id)
}

/// Counters published while a run is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub imported: usize,
    pub skipped: usize,
    pub updated_at: DateTime<Utc>,
}

/// Reports one run's progress and outcome to one user.
#[derive(Clone)]
pub struct ImportReporter {
    cache: Arc<dyn TransientStore>,
    notifications: NotificationService,
    user_id: String,
    progress_ttl: Duration,
}

impl ImportReporter {
    pub fn new(
        cache: Arc<dyn TransientStore>,
        notifications: NotificationService,
        user_id: impl Into<String>,
        progress_ttl: Duration,
    ) -> Self {
        Self {
            cache,
            notifications,
            user_id: user_id.into(),
            progress_ttl,
        }
    }

    /// Overwrite the user's progress snapshot. Failures are logged only.
    pub async fn publish(&self, imported: usize, skipped: usize) {
        let snapshot = ProgressSnapshot {
            imported,
            skipped,
            updated_at: Utc::now(),
        };
        let result = match serde_json::to_string(&snapshot) {
            Ok(json) => {
                self.cache
                    .set_with_expiry(&progress_key(&self.user_id), &json, self.progress_ttl)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to publish progress for {}: {}", self.user_id, e);
        }
    }

    /// Latest published snapshot, if the transient store still holds one.
    pub async fn last_progress(&self) -> Option<ProgressSnapshot> {
        let json = match self.cache.get(&progress_key(&self.user_id)).await {
            Ok(json) => json?,
            Err(e) => {
                tracing::warn!("Failed to read progress for {}: {}", self.user_id, e);
                return None;
            }
        };
        serde_json::from_str(&json)
            .map_err(|e| tracing::warn!("Malformed progress for {}: {}", self.user_id, e))
            .ok()
    }

    /// Terminal notification for a run that finished without a fatal error.
    pub async fn complete(&self, outcome: &ImportOutcome, file_path: &str) {
        let kind = if outcome.has_error_skips() {
            NotificationType::Warning
        } else {
            NotificationType::Success
        };

        tracing::info!(
            "Import of {} finished: {} imported, {} skipped in {:.2}s",
            file_path,
            outcome.imported,
            outcome.skipped,
            outcome.duration.as_secs_f64()
        );

        self.notifications
            .job_completed(
                &self.user_id,
                JOB_NAME,
                outcome.imported,
                outcome.skipped,
                outcome.duration.as_secs_f64(),
                kind,
                serde_json::json!({
                    "total_processed": outcome.total(),
                    "error_skips": outcome.error_skips(),
                    "file_path": file_path,
                    "skip_reasons": reason_strings(outcome),
                }),
            )
            .await;
    }

    /// Terminal notification for a run aborted by a fatal error.
    pub async fn fail(&self, error: &ImportError, outcome: &ImportOutcome, file_path: &str) {
        self.fail_with_message(&error.to_string(), outcome, file_path)
            .await;
    }

    pub async fn fail_with_message(&self, error: &str, outcome: &ImportOutcome, file_path: &str) {
        tracing::error!("Import of {} failed: {}", file_path, error);

        let message = format!(
            "Import failed after {:.2}s: {} | Imported: {} | Skipped: {}",
            outcome.duration.as_secs_f64(),
            error,
            outcome.imported,
            outcome.skipped
        );
        self.notifications
            .import_error(
                &self.user_id,
                "Import Failed",
                &message,
                serde_json::json!({
                    "error": error,
                    "success_count": outcome.imported,
                    "error_count": outcome.skipped,
                    "duration": outcome.duration.as_secs_f64(),
                    "file_path": file_path,
                }),
            )
            .await;
    }

    /// Info notification sent once a chunked run has been dispatched.
    pub async fn processing_started(&self, run_id: &str, total_chunks: usize, file_path: &str) {
        self.notifications
            .import_info(
                &self.user_id,
                "Import Processing Started",
                &format!(
                    "Large file split into {} chunks for parallel processing",
                    total_chunks
                ),
                serde_json::json!({
                    "job_id": run_id,
                    "total_chunks": total_chunks,
                    "file_path": file_path,
                }),
            )
            .await;
    }

    /// Aggregate terminal notification for a chunked run.
    pub async fn finish_run(&self, run_id: &str, summary: &RunSummary, file_path: &str) {
        let outcome = summary.to_outcome();

        if summary.total_chunks > 0 && summary.failed_chunks == summary.total_chunks {
            self.fail_with_message(
                &format!("all {} chunks failed", summary.total_chunks),
                &outcome,
                file_path,
            )
            .await;
            return;
        }

        let kind = if summary.error_skips > 0 || summary.failed_chunks > 0 {
            NotificationType::Warning
        } else {
            NotificationType::Success
        };

        tracing::info!(
            "Chunked import {} finished: {} imported, {} skipped, {} failed chunks",
            run_id,
            summary.imported,
            summary.skipped,
            summary.failed_chunks
        );

        self.notifications
            .job_completed(
                &self.user_id,
                JOB_NAME,
                summary.imported,
                summary.skipped,
                outcome.duration.as_secs_f64(),
                kind,
                serde_json::json!({
                    "run_id": run_id,
                    "total_processed": summary.imported + summary.skipped,
                    "total_chunks": summary.total_chunks,
                    "failed_chunks": summary.failed_chunks,
                    "error_skips": summary.error_skips,
                    "file_path": file_path,
                }),
            )
            .await;
    }
}

fn reason_strings(outcome: &ImportOutcome) -> Vec<String> {
    outcome
        .reasons
        .iter()
        .take(MAX_REASONS_IN_NOTIFICATION)
        .map(ToString::to_string)
        .collect()
}

mod field {
    pub const TOTAL_CHUNKS: &str = "total_chunks";
    pub const COMPLETED: &str = "completed";
    pub const FAILED_CHUNKS: &str = "failed_chunks";
    pub const IMPORTED: &str = "imported";
    pub const SKIPPED: &str = "skipped";
    pub const ERROR_SKIPS: &str = "error_skips";
    pub const STARTED_AT_MS: &str = "started_at_ms";
    /// 1 while the dispatcher may still add chunks.
    pub const DISPATCHING: &str = "dispatching";
}

/// Final counters of a chunked run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_chunks: usize,
    pub failed_chunks: usize,
    pub imported: usize,
    pub skipped: usize,
    pub error_skips: usize,
    pub started_at_ms: i64,
}

impl RunSummary {
    fn from_fields(fields: &HashMap<String, i64>) -> Self {
        let get = |name: &str| fields.get(name).copied().unwrap_or(0);
        let count = |name: &str| get(name).max(0) as usize;
        Self {
            total_chunks: count(field::TOTAL_CHUNKS),
            failed_chunks: count(field::FAILED_CHUNKS),
            imported: count(field::IMPORTED),
            skipped: count(field::SKIPPED),
            error_skips: count(field::ERROR_SKIPS),
            started_at_ms: get(field::STARTED_AT_MS),
        }
    }

    /// Counts only; skip reasons stay with the chunks that produced them.
    pub fn to_outcome(&self) -> ImportOutcome {
        let elapsed_ms = (Utc::now().timestamp_millis() - self.started_at_ms).max(0);
        ImportOutcome {
            imported: self.imported,
            skipped: self.skipped,
            reasons: Vec::new(),
            duration: Duration::from_millis(elapsed_ms as u64),
        }
    }
}

/// Counters after one tally update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyUpdate {
    pub summary: RunSummary,
    /// True only for the update that completed the run.
    pub finished: bool,
}

/// Shared counters of one chunked run.
#[derive(Clone)]
pub struct RunTally {
    cache: Arc<dyn TransientStore>,
    key: String,
    ttl: Duration,
}

impl RunTally {
    pub fn new(cache: Arc<dyn TransientStore>, run_id: &str, ttl: Duration) -> Self {
        Self {
            cache,
            key: run_key(run_id),
            ttl,
        }
    }

    /// Start the run. Must precede every other call.
    pub async fn open(&self) -> CacheResult<()> {
        self.cache
            .hash_increment(
                &self.key,
                &[
                    (field::DISPATCHING, 1),
                    (field::STARTED_AT_MS, Utc::now().timestamp_millis()),
                ],
                self.ttl,
            )
            .await?;
        Ok(())
    }

    /// Count one more chunk. Call before enqueueing it.
    pub async fn add_chunk(&self) -> CacheResult<()> {
        self.increment(&[(field::TOTAL_CHUNKS, 1)]).await?;
        Ok(())
    }

    /// Undo `add_chunk` for a chunk that could not be enqueued.
    pub async fn remove_chunk(&self) -> CacheResult<()> {
        self.increment(&[(field::TOTAL_CHUNKS, -1)]).await?;
        Ok(())
    }

    /// Stop adding chunks, folding in rows rejected before dispatch.
    pub async fn seal(&self, pre_skipped: usize, pre_error_skips: usize) -> CacheResult<TallyUpdate> {
        self.increment(&[
            (field::DISPATCHING, -1),
            (field::SKIPPED, pre_skipped as i64),
            (field::ERROR_SKIPS, pre_error_skips as i64),
        ])
        .await
    }

    /// Record a chunk that ran to completion.
    pub async fn record_chunk(&self, outcome: &ImportOutcome) -> CacheResult<TallyUpdate> {
        self.increment(&[
            (field::COMPLETED, 1),
            (field::IMPORTED, outcome.imported as i64),
            (field::SKIPPED, outcome.skipped as i64),
            (field::ERROR_SKIPS, outcome.error_skips() as i64),
        ])
        .await
    }

    /// Record a chunk that failed for good; its rows count as error skips.
    pub async fn record_failed_chunk(&self, rows: usize) -> CacheResult<TallyUpdate> {
        self.increment(&[
            (field::COMPLETED, 1),
            (field::FAILED_CHUNKS, 1),
            (field::SKIPPED, rows as i64),
            (field::ERROR_SKIPS, rows as i64),
        ])
        .await
    }

    /// Remove the counters once the run is reported.
    pub async fn clear(&self) {
        if let Err(e) = self.cache.delete(&self.key).await {
            tracing::warn!("Failed to clear run tally {}: {}", self.key, e);
        }
    }

    /// Apply deltas and report whether this update finished the run.
    async fn increment(&self, deltas: &[(&str, i64)]) -> CacheResult<TallyUpdate> {
        let fields = self.cache.hash_increment(&self.key, deltas, self.ttl).await?;

        let get = |name: &str| fields.get(name).copied().unwrap_or(0);
        let finishing = deltas
            .iter()
            .any(|(f, _)| *f == field::COMPLETED || *f == field::DISPATCHING);
        let finished =
            get(field::DISPATCHING) == 0 && get(field::COMPLETED) == get(field::TOTAL_CHUNKS);

        Ok(TallyUpdate {
            summary: RunSummary::from_fields(&fields),
            finished: finishing && finished,
        })
    }
}

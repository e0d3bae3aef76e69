//! Splits a large file into chunk tasks.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use super::parser::{ParsedRow, RawRecord, RecordParser};
use super::reporter::{ImportReporter, RunSummary, RunTally};
use super::{ImportContext, ImportError, SkipReason};
use crate::cache::{CacheError, TransientStore};
use crate::config::ImportSettings;
use crate::work_queue::{ChunkTask, Task, TaskQueue};

/// What a dispatch produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSummary {
    pub run_id: String,
    pub total_chunks: usize,
    /// Rows carried by the dispatched chunks.
    pub rows: usize,
    /// Rows rejected while reading, before any chunk saw them.
    pub pre_skipped: Vec<SkipReason>,
    /// Set when every chunk had already finished by the time dispatch
    /// was sealed, so the dispatcher reported the run itself.
    pub finished: Option<RunSummary>,
}

/// Reads rows, groups them into chunks and enqueues one task per chunk.
pub struct ChunkDispatcher {
    queue: Arc<dyn TaskQueue>,
    cache: Arc<dyn TransientStore>,
    settings: ImportSettings,
}

/// New run id, shared by every chunk of one file.
pub fn new_run_id() -> String {
    format!("import_{}", uuid::Uuid::new_v4().simple())
}

impl ChunkDispatcher {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        cache: Arc<dyn TransientStore>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            queue,
            cache,
            settings,
        }
    }

    /// Dispatch every row of `parser` in chunks of `chunk_size`.
    ///
    /// Deletes `file_path` once all rows are read, sends the "processing
    /// started" notification when chunks were dispatched, and does not wait
    /// for any chunk. A run with no chunks is reported here.
    pub async fn dispatch<R>(
        &self,
        parser: RecordParser<R>,
        ctx: &ImportContext,
        file_path: &Path,
        chunk_size: usize,
        reporter: &ImportReporter,
    ) -> Result<DispatchSummary, ImportError>
    where
        R: Read + Send + 'static,
    {
        let chunk_size = chunk_size.max(1);
        let run_id = new_run_id();
        let file_label = file_path.display().to_string();
        let started_at_ms = chrono::Utc::now().timestamp_millis();
        let run_tally = RunTally::new(
            self.cache.clone(),
            &run_id,
            std::time::Duration::from_secs(self.settings.run_tally_ttl_secs),
        );
        let mut tally = match run_tally.open().await {
            Ok(()) => Some(run_tally),
            Err(e) => untracked(&run_id, &e),
        };

        let mut summary = DispatchSummary {
            run_id: run_id.clone(),
            total_chunks: 0,
            rows: 0,
            pre_skipped: Vec::new(),
            finished: None,
        };

        // On failure the tally stays unsealed, so chunks already enqueued
        // can never finish it and only the failing job reports the file.
        let result = self
            .enqueue_chunks(parser, ctx, &file_label, chunk_size, &mut tally, &mut summary)
            .await;
        if let Err(e) = result {
            if summary.total_chunks > 0 {
                tracing::warn!(
                    "Abandoning run {} after enqueueing {} chunks",
                    run_id,
                    summary.total_chunks
                );
            }
            return Err(e);
        }

        let pre_errors = summary.pre_skipped.iter().filter(|r| r.is_error()).count();
        let sealed = match &tally {
            Some(t) => t.seal(summary.pre_skipped.len(), pre_errors).await.map(Some),
            None => Ok(None),
        };
        let sealed = sealed.unwrap_or_else(|e| {
            tally = untracked(&run_id, &e);
            None
        });

        remove_file(file_path).await;

        if summary.total_chunks > 0 {
            tracing::info!(
                "Dispatched {} rows of {} in {} chunks (run {})",
                summary.rows,
                file_label,
                summary.total_chunks,
                run_id
            );
            reporter
                .processing_started(&run_id, summary.total_chunks, &file_label)
                .await;
        }

        let finished = match (sealed, tally.as_ref()) {
            (Some(update), Some(t)) if update.finished => {
                t.clear().await;
                Some(update.summary)
            }
            // Without a tally nothing else will report a run that has no chunks.
            (None, _) if summary.total_chunks == 0 => Some(RunSummary {
                skipped: summary.pre_skipped.len(),
                error_skips: pre_errors,
                started_at_ms,
                ..RunSummary::default()
            }),
            _ => None,
        };
        if let Some(run) = finished {
            reporter.finish_run(&run_id, &run, &file_label).await;
            summary.finished = Some(run);
        }

        Ok(summary)
    }

    async fn enqueue_chunks<R>(
        &self,
        mut parser: RecordParser<R>,
        ctx: &ImportContext,
        file_label: &str,
        chunk_size: usize,
        tally: &mut Option<RunTally>,
        summary: &mut DispatchSummary,
    ) -> Result<(), ImportError>
    where
        R: Read + Send + 'static,
    {
        let mut buffer: Vec<RawRecord> = Vec::with_capacity(chunk_size);

        loop {
            let want = chunk_size - buffer.len();
            let (returned, batch) =
                tokio::task::spawn_blocking(move || {
                    let batch = parser.read_batch(want);
                    (parser, batch)
                })
                .await?;
            parser = returned;
            let batch = batch?;
            let exhausted = batch.is_empty();

            for row in batch {
                match row {
                    ParsedRow::Record(raw) => buffer.push(raw),
                    ParsedRow::Skipped(reason) => summary.pre_skipped.push(reason),
                }
            }

            if buffer.len() >= chunk_size || (exhausted && !buffer.is_empty()) {
                let rows = std::mem::replace(&mut buffer, Vec::with_capacity(chunk_size));
                self.enqueue_chunk(rows, ctx, file_label, tally, summary)
                    .await?;
            }

            if exhausted {
                return Ok(());
            }
        }
    }

    async fn enqueue_chunk(
        &self,
        rows: Vec<RawRecord>,
        ctx: &ImportContext,
        file_label: &str,
        tally: &mut Option<RunTally>,
        summary: &mut DispatchSummary,
    ) -> Result<(), ImportError> {
        let row_count = rows.len();
        let task = Task::ProcessChunk(ChunkTask {
            run_id: summary.run_id.clone(),
            chunk_index: summary.total_chunks,
            rows,
            context: ctx.clone(),
            file_path: file_label.to_string(),
        });

        let added = match tally.as_ref() {
            Some(t) => t.add_chunk().await,
            None => Ok(()),
        };
        if let Err(e) = added {
            *tally = untracked(&summary.run_id, &e);
        }

        if let Err(e) = self.queue.enqueue(&self.settings.chunk_queue, task).await {
            if let Some(t) = tally.as_ref() {
                if let Err(undo) = t.remove_chunk().await {
                    tracing::warn!("Failed to roll back chunk count: {}", undo);
                }
            }
            return Err(e.into());
        }

        summary.total_chunks += 1;
        summary.rows += row_count;
        Ok(())
    }
}

/// Stop tracking a run whose tally the transient store could not update.
///
/// Chunks still run and publish progress; the run just gets no final report.
fn untracked(run_id: &str, error: &CacheError) -> Option<RunTally> {
    tracing::warn!(
        "Run tally for {} unavailable, continuing without a run report: {}",
        run_id,
        error
    );
    None
}

async fn remove_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed temporary file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

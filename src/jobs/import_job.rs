//! Whole-file import job.
//!
//! Picks a strategy from the file size and variant, then either processes
//! the file in sequential batches or hands it to the chunk dispatcher.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{is_retryable, JobContext};
use crate::import::{
    process_rows, select_strategy, ChunkDispatcher, ImportError, ImportOutcome, ImportReporter,
    RecordParser, Strategy,
};
use crate::work_queue::ImportFileTask;

/// What the job did with the file.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportJobResult {
    /// Processed in-line; the outcome was reported.
    Direct(ImportOutcome),
    /// Split into chunks for the worker pool.
    Dispatched { run_id: String, total_chunks: usize },
}

/// Run one attempt.
///
/// A failure that will not be retried (fatal, or on the last attempt) is
/// reported here with whatever counts were accumulated.
pub async fn run(
    ctx: &JobContext,
    task: &ImportFileTask,
    final_attempt: bool,
) -> Result<ImportJobResult, ImportError> {
    let started = Instant::now();
    let reporter = ctx.reporter(&task.context.uploader);
    let file_label = task.file_path.display().to_string();
    let mut outcome = ImportOutcome::new();

    tracing::info!("Starting import of {} ({:?})", file_label, task.variant);

    match process(ctx, task, &reporter, &mut outcome, started).await {
        Ok(result) => Ok(result),
        Err(e) => {
            outcome.duration = started.elapsed();
            if final_attempt || !is_retryable(&e) {
                reporter.fail(&e, &outcome, &file_label).await;
            } else {
                tracing::warn!("Import of {} failed, will retry: {}", file_label, e);
            }
            Err(e)
        }
    }
}

async fn process(
    ctx: &JobContext,
    task: &ImportFileTask,
    reporter: &ImportReporter,
    outcome: &mut ImportOutcome,
    started: Instant,
) -> Result<ImportJobResult, ImportError> {
    let file_size = tokio::fs::metadata(&task.file_path).await?.len();
    let strategy = select_strategy(file_size, &ctx.settings, task.variant);
    let parser = open_parser(task.file_path.clone(), ctx.settings.delimiter).await?;

    tracing::debug!("{} bytes, strategy {:?}", file_size, strategy);

    match strategy {
        Strategy::Direct { batch_size } => {
            run_direct(ctx, parser, task, batch_size, reporter, outcome).await?;
            outcome.duration = started.elapsed();
            remove_file(&task.file_path).await;
            reporter
                .complete(outcome, &task.file_path.display().to_string())
                .await;
            Ok(ImportJobResult::Direct(outcome.clone()))
        }
        Strategy::Chunked { chunk_size } => {
            let dispatcher =
                ChunkDispatcher::new(ctx.queue.clone(), ctx.cache.clone(), ctx.settings.clone());
            let summary = dispatcher
                .dispatch(parser, &task.context, &task.file_path, chunk_size, reporter)
                .await?;
            Ok(ImportJobResult::Dispatched {
                run_id: summary.run_id,
                total_chunks: summary.total_chunks,
            })
        }
    }
}

async fn open_parser(path: PathBuf, delimiter: u8) -> Result<RecordParser<File>, ImportError> {
    tokio::task::spawn_blocking(move || RecordParser::open(&path, delimiter)).await?
}

/// Sequential batches, yielding to the scheduler between them.
async fn run_direct<R>(
    ctx: &JobContext,
    mut parser: RecordParser<R>,
    task: &ImportFileTask,
    batch_size: usize,
    reporter: &ImportReporter,
    outcome: &mut ImportOutcome,
) -> Result<(), ImportError>
where
    R: Read + Send + 'static,
{
    let mut batch_number = 0usize;
    // Clear counts left over from this user's previous run.
    reporter.publish(0, 0).await;

    loop {
        let (returned, batch) = tokio::task::spawn_blocking(move || {
            let batch = parser.read_batch(batch_size);
            (parser, batch)
        })
        .await?;
        parser = returned;

        let batch = batch?;
        if batch.is_empty() {
            return Ok(());
        }
        batch_number += 1;

        let batch_outcome = process_rows(batch, &task.context, ctx.store.as_ref()).await;
        tracing::info!(
            "Batch {}: {} imported, {} skipped",
            batch_number,
            batch_outcome.imported,
            batch_outcome.skipped
        );
        outcome.merge(batch_outcome);

        reporter.publish(outcome.imported, outcome.skipped).await;
        tokio::task::yield_now().await;
    }
}

async fn remove_file(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

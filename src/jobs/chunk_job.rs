//! Worker for one chunk of a chunked run.

use std::time::{Duration, Instant};

use super::JobContext;
use crate::import::{process_rows, ImportError, ImportOutcome, ParsedRow, RunTally, TallyUpdate};
use crate::work_queue::ChunkTask;

/// Process the chunk's rows and add the result to the run tally.
///
/// Safe to repeat: rows already written are skipped by the store check.
pub async fn run(ctx: &JobContext, chunk: &ChunkTask) -> Result<ImportOutcome, ImportError> {
    let started = Instant::now();
    let rows = chunk.rows.iter().cloned().map(ParsedRow::Record).collect();

    let mut outcome = process_rows(rows, &chunk.context, ctx.store.as_ref()).await;
    outcome.duration = started.elapsed();

    tracing::info!(
        "Chunk {} of {}: {} imported, {} skipped in {:.2}s",
        chunk.chunk_index,
        chunk.run_id,
        outcome.imported,
        outcome.skipped,
        outcome.duration.as_secs_f64()
    );

    match tally(ctx, chunk).record_chunk(&outcome).await {
        Ok(update) => settle(ctx, chunk, update).await,
        Err(e) => tracing::warn!(
            "Failed to record chunk {} of {}: {}",
            chunk.chunk_index,
            chunk.run_id,
            e
        ),
    }

    Ok(outcome)
}

/// Count a chunk that will not be attempted again.
pub async fn record_failure(ctx: &JobContext, chunk: &ChunkTask) {
    match tally(ctx, chunk).record_failed_chunk(chunk.rows.len()).await {
        Ok(update) => settle(ctx, chunk, update).await,
        Err(e) => tracing::error!(
            "Failed to record failed chunk {} of {}: {}",
            chunk.chunk_index,
            chunk.run_id,
            e
        ),
    }
}

fn tally(ctx: &JobContext, chunk: &ChunkTask) -> RunTally {
    RunTally::new(
        ctx.cache.clone(),
        &chunk.run_id,
        Duration::from_secs(ctx.settings.run_tally_ttl_secs),
    )
}

/// Publish run-wide progress; the finishing chunk reports the run.
async fn settle(ctx: &JobContext, chunk: &ChunkTask, update: TallyUpdate) {
    let reporter = ctx.reporter(&chunk.context.uploader);
    reporter
        .publish(update.summary.imported, update.summary.skipped)
        .await;

    if update.finished {
        reporter
            .finish_run(&chunk.run_id, &update.summary, &chunk.file_path)
            .await;
        tally(ctx, chunk).clear().await;
    }
}

//! Background jobs executed by the worker pool.
//!
//! `JobRunner` routes each queued task to its job and maps job errors onto
//! the pool's retry policy.

pub mod chunk_job;
pub mod import_job;
pub mod permissions_job;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::TransientStore;
use crate::config::ImportSettings;
use crate::import::{ImportError, ImportOutcome, ImportReporter};
use crate::notify::{NotificationService, NotificationSink};
use crate::repository::DocumentStore;
use crate::work_queue::{QueuedTask, Task, TaskHandler, TaskQueue, WorkQueueError};

/// Collaborators shared by every job.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn DocumentStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub cache: Arc<dyn TransientStore>,
    pub notifications: NotificationService,
    pub settings: ImportSettings,
}

impl JobContext {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn TaskQueue>,
        cache: Arc<dyn TransientStore>,
        sink: Arc<dyn NotificationSink>,
        settings: ImportSettings,
    ) -> Self {
        Self {
            store,
            queue,
            cache,
            notifications: NotificationService::new(sink),
            settings,
        }
    }

    pub fn reporter(&self, user_id: &str) -> ImportReporter {
        ImportReporter::new(
            self.cache.clone(),
            self.notifications.clone(),
            user_id,
            Duration::from_secs(self.settings.progress_ttl_secs),
        )
    }
}

/// Whether a failed attempt is worth repeating.
///
/// Unreadable input will not become readable; store, queue and cache
/// outages may clear up.
pub fn is_retryable(error: &ImportError) -> bool {
    match error {
        ImportError::Io(_) | ImportError::Csv(_) | ImportError::Join(_) => false,
        ImportError::Store(_)
        | ImportError::Queue(_)
        | ImportError::Cache(_)
        | ImportError::Timeout(_) => true,
    }
}

fn to_queue_error(error: ImportError) -> WorkQueueError {
    let message = error.to_string();
    if is_retryable(&error) {
        WorkQueueError::retryable(message)
    } else {
        WorkQueueError::fatal(message)
    }
}

/// Task handler for every job type.
#[derive(Clone)]
pub struct JobRunner {
    ctx: JobContext,
}

impl JobRunner {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &JobContext {
        &self.ctx
    }
}

#[async_trait]
impl TaskHandler for JobRunner {
    async fn handle(&self, task: &QueuedTask) -> Result<(), WorkQueueError> {
        match &task.task {
            Task::ImportFile(job) => {
                let final_attempt = task.attempt >= self.ctx.settings.tries;
                import_job::run(&self.ctx, job, final_attempt)
                    .await
                    .map(|_| ())
                    .map_err(to_queue_error)
            }
            Task::ProcessChunk(chunk) => {
                chunk_job::run(&self.ctx, chunk)
                    .await
                    .map(|_| ())
                    .map_err(to_queue_error)
            }
            Task::UpdatePermissions(job) => {
                permissions_job::run(&self.ctx, job).await;
                Ok(())
            }
        }
    }

    fn timeout(&self, task: &Task) -> Duration {
        match task {
            Task::ProcessChunk(_) => self.ctx.settings.chunk_timeout(),
            Task::ImportFile(_) | Task::UpdatePermissions(_) => self.ctx.settings.job_timeout(),
        }
    }

    async fn on_failure(&self, task: &QueuedTask, error: &WorkQueueError) {
        match &task.task {
            Task::ImportFile(job) => {
                // Other failures were reported by the job itself, with counts.
                // A timeout dropped the job's counters; its last published
                // snapshot holds what the finished batches wrote.
                if let WorkQueueError::Timeout(limit) = error {
                    let reporter = self.ctx.reporter(&job.context.uploader);
                    let mut outcome = ImportOutcome {
                        duration: *limit,
                        ..ImportOutcome::default()
                    };
                    if let Some(progress) = reporter.last_progress().await {
                        outcome.imported = progress.imported;
                        outcome.skipped = progress.skipped;
                    }
                    reporter
                        .fail(
                            &ImportError::Timeout(*limit),
                            &outcome,
                            &job.file_path.display().to_string(),
                        )
                        .await;
                }
            }
            Task::ProcessChunk(chunk) => chunk_job::record_failure(&self.ctx, chunk).await,
            Task::UpdatePermissions(job) => {
                self.ctx
                    .notifications
                    .import_error(
                        &job.user_id,
                        "Permission Update Failed",
                        &error.to_string(),
                        serde_json::json!({ "documents": job.document_ids.len() }),
                    )
                    .await;
            }
        }
    }
}

//! Worker pool: drains a `LocalTaskQueue` with bounded concurrency.
//!
//! Each attempt runs under `tokio::time::timeout`. Retryable failures are
//! attempted again up to `tries` times; after that, or on a non-retryable
//! failure, the handler's `on_failure` hook runs once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::{LocalTaskQueue, QueuedTask, Task, WorkQueueError};

/// Marks a task finished when its worker ends, even by panicking.
struct TaskDone(LocalTaskQueue);

impl Drop for TaskDone {
    fn drop(&mut self) {
        self.0.task_done();
    }
}

/// Executes tasks pulled from the queue.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Run one attempt.
    async fn handle(&self, task: &QueuedTask) -> Result<(), WorkQueueError>;

    /// Wall-clock bound for one attempt of `task`.
    fn timeout(&self, task: &Task) -> Duration;

    /// Called once when the task will not be attempted again.
    async fn on_failure(&self, task: &QueuedTask, error: &WorkQueueError);
}

pub struct WorkerPool {
    queue: LocalTaskQueue,
    handler: Arc<dyn TaskHandler>,
    concurrency: usize,
    tries: u32,
}

impl WorkerPool {
    pub fn new(
        queue: LocalTaskQueue,
        handler: Arc<dyn TaskHandler>,
        concurrency: usize,
        tries: u32,
    ) -> Self {
        Self {
            queue,
            handler,
            concurrency: concurrency.max(1),
            tries: tries.max(1),
        }
    }

    /// Start draining the queue in the background.
    ///
    /// Returns `None` if another pool already owns the queue's receiver.
    pub async fn spawn(self) -> Option<tokio::task::JoinHandle<()>> {
        let rx = self.queue.take_receiver().await?;
        Some(tokio::spawn(self.run(rx)))
    }

    async fn run(self, mut rx: tokio::sync::mpsc::UnboundedReceiver<QueuedTask>) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut workers = JoinSet::new();

        while let Some(task) = rx.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let handler = self.handler.clone();
            let queue = self.queue.clone();
            let tries = self.tries;

            workers.spawn(async move {
                let _done = TaskDone(queue);
                let _permit = permit;
                execute(handler.as_ref(), task, tries).await;
            });

            // Reap finished workers so the set does not grow unbounded.
            while let Some(result) = workers.try_join_next() {
                if let Err(e) = result {
                    tracing::error!("Worker panicked: {}", e);
                }
            }
        }

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!("Worker panicked: {}", e);
            }
        }
    }
}

/// Run `task` until it succeeds, fails fatally, or runs out of attempts.
pub async fn execute(handler: &dyn TaskHandler, mut task: QueuedTask, tries: u32) {
    loop {
        task.attempt += 1;
        let limit = handler.timeout(&task.task);

        let result = match tokio::time::timeout(limit, handler.handle(&task)).await {
            Ok(result) => result,
            Err(_) => Err(WorkQueueError::Timeout(limit)),
        };

        match result {
            Ok(()) => {
                tracing::debug!(
                    "Task {} ({}) finished on attempt {}",
                    task.id,
                    task.task.name(),
                    task.attempt
                );
                return;
            }
            Err(e) if e.is_retryable() && task.attempt < tries => {
                tracing::warn!(
                    "Task {} ({}) attempt {}/{} failed, retrying: {}",
                    task.id,
                    task.task.name(),
                    task.attempt,
                    tries,
                    e
                );
            }
            Err(e) => {
                tracing::error!(
                    "Task {} ({}) failed after {} attempt(s): {}",
                    task.id,
                    task.task.name(),
                    task.attempt,
                    e
                );
                handler.on_failure(&task, &e).await;
                return;
            }
        }
    }
}

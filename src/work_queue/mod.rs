//! Task scheduling for import jobs.
//!
//! Producers enqueue named work through `TaskQueue`. The local
//! implementation hands tasks to a `WorkerPool` in the same process, which
//! bounds each attempt with a timeout and retries failures. A message broker
//! could implement the same trait.

mod error;
mod local;
pub mod runner;
mod task;

pub use error::WorkQueueError;
pub use local::LocalTaskQueue;
pub use runner::{TaskHandler, WorkerPool};
pub use task::{ChunkTask, ImportFileTask, PermissionsTask, QueuedTask, Task};

use async_trait::async_trait;

/// A queue that accepts named work.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Schedule `task` on the named queue. Returns the task id.
    async fn enqueue(&self, queue: &str, task: Task) -> Result<String, WorkQueueError>;
}

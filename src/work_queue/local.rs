//! In-process task queue backed by a tokio channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use super::{QueuedTask, Task, TaskQueue, WorkQueueError};

/// Unbounded in-process queue.
///
/// Tracks tasks that were enqueued but not yet finished so callers can wait
/// for the whole run, including tasks enqueued by other tasks.
#[derive(Clone)]
pub struct LocalTaskQueue {
    tx: mpsc::UnboundedSender<QueuedTask>,
    rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<QueuedTask>>>>,
    pending: Arc<watch::Sender<usize>>,
}

impl Default for LocalTaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalTaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (pending, _) = watch::channel(0);
        Self {
            tx,
            rx: Arc::new(Mutex::new(Some(rx))),
            pending: Arc::new(pending),
        }
    }

    /// Take the consuming end. Only the first caller gets it.
    pub async fn take_receiver(&self) -> Option<mpsc::UnboundedReceiver<QueuedTask>> {
        self.rx.lock().await.take()
    }

    /// Tasks enqueued and not yet finished.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Mark one task as finished.
    pub fn task_done(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Wait until every enqueued task has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[async_trait]
impl TaskQueue for LocalTaskQueue {
    async fn enqueue(&self, queue: &str, task: Task) -> Result<String, WorkQueueError> {
        let queued = QueuedTask::new(queue, task);
        let id = queued.id.clone();

        self.pending.send_modify(|n| *n += 1);
        if self.tx.send(queued).is_err() {
            self.task_done();
            return Err(WorkQueueError::Closed);
        }

        tracing::debug!("Enqueued task {} on '{}'", id, queue);
        Ok(id)
    }
}

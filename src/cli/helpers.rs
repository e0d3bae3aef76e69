//! Shared helpers for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;

use crate::cache;
use crate::config::Settings;
use crate::jobs::{JobContext, JobRunner};
use crate::models::{Notification, NotificationType};
use crate::repository::{AsyncSqlitePool, DieselDocumentStore, DieselNotificationRepository};
use crate::work_queue::{LocalTaskQueue, WorkerPool};

/// Everything a command needs to run jobs against the configured stores.
pub struct Services {
    pub settings: Settings,
    pub notifications: DieselNotificationRepository,
    pub queue: LocalTaskQueue,
    pub runner: Arc<JobRunner>,
}

impl Services {
    /// Open the database and transient store, creating tables if needed.
    pub async fn open(settings: &Settings) -> anyhow::Result<Self> {
        settings.ensure_directories()?;

        let pool = AsyncSqlitePool::new(&settings.database_url());
        pool.init_schema().await?;

        let store = DieselDocumentStore::new(pool.clone());
        let notifications = DieselNotificationRepository::new(pool);
        let cache = cache::connect(settings.cache_url.as_deref()).await?;
        let queue = LocalTaskQueue::new();

        let ctx = JobContext::new(
            Arc::new(store),
            Arc::new(queue.clone()),
            cache,
            Arc::new(notifications.clone()),
            settings.import.clone(),
        );

        Ok(Self {
            settings: settings.clone(),
            notifications,
            queue,
            runner: Arc::new(JobRunner::new(ctx)),
        })
    }

    /// Start the worker pool draining the local queue.
    pub async fn start_workers(&self) -> anyhow::Result<tokio::task::JoinHandle<()>> {
        WorkerPool::new(
            self.queue.clone(),
            self.runner.clone(),
            self.settings.import.worker_concurrency,
            self.settings.import.tries,
        )
        .spawn()
        .await
        .ok_or_else(|| anyhow::anyhow!("Worker pool already started"))
    }
}

/// Copy the input into the uploads directory.
///
/// Import jobs delete their file once it has been processed, so they only
/// ever see a private copy.
pub async fn stage_upload(settings: &Settings, file: &Path) -> anyhow::Result<PathBuf> {
    let uploads = settings.data_dir.join("uploads");
    tokio::fs::create_dir_all(&uploads).await?;

    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv");
    let staged = uploads.join(format!(
        "{}.{}",
        uuid::Uuid::new_v4().simple(),
        extension
    ));
    tokio::fs::copy(file, &staged).await?;
    Ok(staged)
}

pub fn print_notification(notification: &Notification) {
    let marker = match notification.kind {
        NotificationType::Success => style("✓").green(),
        NotificationType::Info => style("•").cyan(),
        NotificationType::Warning => style("!").yellow(),
        NotificationType::Error => style("✗").red(),
    };

    println!(
        "{} {} {}",
        marker,
        style(&notification.title).bold(),
        style(notification.created_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    if !notification.message.is_empty() {
        println!("  {}", notification.message);
    }
}

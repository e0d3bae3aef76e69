//! Notification creation for background jobs.
//!
//! Jobs never talk to a delivery mechanism directly: they create records
//! through a `NotificationSink`. `NotificationService` wraps a sink with the
//! conventions shared by all jobs (titles, priorities, best-effort logging).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{category, NewNotification, Notification, NotificationType, Priority};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Notification backend unavailable: {0}")]
    Unavailable(String),
}

/// Something that can persist notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Create a notification record.
    async fn create(&self, notification: NewNotification) -> Result<Notification, NotifyError>;

    /// Most recent unexpired notifications for a user, newest first.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, NotifyError>;
}

/// In-memory sink, used by tests and dry runs.
#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    notifications: Arc<RwLock<Vec<Notification>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All notifications in creation order.
    pub async fn all(&self) -> Vec<Notification> {
        self.notifications.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn create(&self, notification: NewNotification) -> Result<Notification, NotifyError> {
        let stored = Notification::from_new(notification, Utc::now());
        self.notifications.write().await.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Notification>, NotifyError> {
        let now = Utc::now();
        Ok(self
            .notifications
            .read()
            .await
            .iter()
            .rev()
            .filter(|n| n.user_id == user_id && n.expires_at > now)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Job-facing notification helpers.
#[derive(Clone)]
pub struct NotificationService {
    sink: Arc<dyn NotificationSink>,
}

impl NotificationService {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    /// Create a notification. Failures are logged and swallowed.
    pub async fn create(&self, notification: NewNotification) -> Option<Notification> {
        let user_id = notification.user_id.clone();
        let title = notification.title.clone();
        match self.sink.create(notification).await {
            Ok(stored) => {
                tracing::info!(
                    notification_id = %stored.id,
                    user_id = %stored.user_id,
                    kind = stored.kind.as_str(),
                    category = %stored.category,
                    "Notification created: {}",
                    stored.title
                );
                Some(stored)
            }
            Err(e) => {
                tracing::error!(user_id = %user_id, "Failed to create notification '{}': {}", title, e);
                None
            }
        }
    }

    /// Notification for a finished job with success and skip counts.
    ///
    /// `kind` is decided by the caller; warnings and errors get high priority.
    #[allow(clippy::too_many_arguments)]
    pub async fn job_completed(
        &self,
        user_id: &str,
        job_name: &str,
        succeeded: usize,
        skipped: usize,
        duration_secs: f64,
        kind: NotificationType,
        extra: serde_json::Value,
    ) -> Option<Notification> {
        let title = format!("Job Completed: {}", job_name);
        let message = format!(
            "Succeeded: {} | Skipped: {} | Duration: {:.2}s",
            succeeded, skipped, duration_secs
        );

        let mut data = serde_json::json!({
            "job_name": job_name,
            "success_count": succeeded,
            "error_count": skipped,
            "duration": duration_secs,
        });
        merge_json(&mut data, extra);

        self.create(
            NewNotification::new(user_id, title, message, kind, category::JOB)
                .with_data(data)
                .with_priority(priority_for(kind)),
        )
        .await
    }

    /// Informational notification in the import category.
    pub async fn import_info(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) -> Option<Notification> {
        self.create(
            NewNotification::new(user_id, title, message, NotificationType::Info, category::IMPORT)
                .with_data(data),
        )
        .await
    }

    /// Error notification in the import category.
    pub async fn import_error(
        &self,
        user_id: &str,
        title: &str,
        message: &str,
        data: serde_json::Value,
    ) -> Option<Notification> {
        self.create(
            NewNotification::new(
                user_id,
                title,
                message,
                NotificationType::Error,
                category::IMPORT,
            )
            .with_data(data)
            .with_priority(Priority::High),
        )
        .await
    }
}

fn priority_for(kind: NotificationType) -> Priority {
    match kind {
        NotificationType::Warning | NotificationType::Error => Priority::High,
        NotificationType::Info | NotificationType::Success => Priority::Normal,
    }
}

/// Shallow-merge `extra` into `base` when both are objects.
fn merge_json(base: &mut serde_json::Value, extra: serde_json::Value) {
    if let (Some(base), serde_json::Value::Object(extra)) = (base.as_object_mut(), extra) {
        for (k, v) in extra {
            base.insert(k, v);
        }
    }
}

//! User-facing notifications emitted by background jobs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Notifications expire after this many days unless told otherwise.
pub const DEFAULT_EXPIRY_DAYS: i64 = 7;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "success" => Some(Self::Success),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Normal,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "high" => Self::High,
            _ => Self::Normal,
        }
    }
}

/// Notification categories used by the import jobs.
pub mod category {
    pub const JOB: &str = "job";
    pub const IMPORT: &str = "import";
    pub const SYSTEM: &str = "system";
}

/// A notification to be created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationType,
    pub category: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    pub expires_at: DateTime<Utc>,
}

impl NewNotification {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        kind: NotificationType,
        category: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            message: message.into(),
            kind,
            category: category.into(),
            data: serde_json::Value::Object(Default::default()),
            priority: Priority::Normal,
            expires_at: Utc::now() + Duration::days(DEFAULT_EXPIRY_DAYS),
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

/// A stored notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationType,
    pub category: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Materialize a new notification with a fresh ID.
    pub fn from_new(new: NewNotification, now: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id,
            title: new.title,
            message: new.message,
            kind: new.kind,
            category: new.category,
            data: new.data,
            priority: new.priority,
            read_at: None,
            expires_at: new.expires_at,
            created_at: now,
        }
    }
}

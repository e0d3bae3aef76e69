//! Work queue error types.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkQueueError {
    #[error("Queue is closed")]
    Closed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Task timed out after {0:?}")]
    Timeout(Duration),
    #[error("Task failed: {message}")]
    Failed { message: String, retryable: bool },
    #[error("{0}")]
    Other(String),
}

impl WorkQueueError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Failed { retryable, .. } => *retryable,
            Self::Closed | Self::Serialization(_) | Self::Other(_) => false,
        }
    }
}

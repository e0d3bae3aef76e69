//! Serializable task payloads.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::import::{ImportContext, ImportVariant, RawRecord};
use crate::models::Permissions;

/// Import a whole file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportFileTask {
    pub file_path: PathBuf,
    pub context: ImportContext,
    pub variant: ImportVariant,
}

/// Process one chunk of a chunked run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkTask {
    pub run_id: String,
    /// 0-based position of this chunk.
    pub chunk_index: usize,
    pub rows: Vec<RawRecord>,
    pub context: ImportContext,
    /// Source file, for reporting only (it is deleted after dispatch).
    pub file_path: String,
}

/// Replace the permissions of a set of documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionsTask {
    pub user_id: String,
    pub document_ids: Vec<String>,
    pub permissions: Permissions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    ImportFile(ImportFileTask),
    ProcessChunk(ChunkTask),
    UpdatePermissions(PermissionsTask),
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::ImportFile(_) => "import_file",
            Task::ProcessChunk(_) => "process_chunk",
            Task::UpdatePermissions(_) => "update_permissions",
        }
    }
}

/// A task as it travels through a queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    pub id: String,
    pub queue: String,
    pub task: Task,
    /// Attempts started so far.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(queue: &str, task: Task) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            queue: queue.to_string(),
            task,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }
}

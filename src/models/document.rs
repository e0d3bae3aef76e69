//! Canonical document model produced by the import pipeline.
//!
//! A `CanonicalDocument` is the unit of persistence. Its identity is the
//! (filename, file_location.path) pair, compared through `DedupKey`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a stored document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Active,
    Inactive,
    Archived,
    /// Any other value carried through from the source file.
    Other(String),
}

impl DocumentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Archived => "archived",
            Self::Other(s) => s.as_str(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "active" => Self::Active,
            "inactive" => Self::Inactive,
            "archived" => Self::Archived,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl Default for DocumentStatus {
    fn default() -> Self {
        Self::Active
    }
}

/// Typed metadata: two fixed fields plus the dynamic `metadata_*` columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Document class (e.g. "DECRETO", "LEI").
    pub document_type: Option<String>,
    /// Year of the document, 0 when unknown.
    pub document_year: i64,
    /// Every other `metadata_<name>` column, keyed by `<name>`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional: BTreeMap<String, String>,
}

/// Group references granting read and write access.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub read_group_refs: Vec<String>,
    pub write_group_refs: Vec<String>,
}

impl Permissions {
    /// Build a descriptor, dropping blank references.
    pub fn new<R, W>(read: R, write: W) -> Self
    where
        R: IntoIterator,
        R::Item: AsRef<str>,
        W: IntoIterator,
        W::Item: AsRef<str>,
    {
        fn clean<I>(refs: I) -> Vec<String>
        where
            I: IntoIterator,
            I::Item: AsRef<str>,
        {
            refs.into_iter()
                .map(|r| r.as_ref().trim().to_string())
                .filter(|r| !r.is_empty())
                .collect()
        }

        Self {
            read_group_refs: clean(read),
            write_group_refs: clean(write),
        }
    }
}

/// Where the document's file lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLocation {
    /// Normalized path (forward slashes, lowercase `.pdf`).
    pub path: String,
    pub storage_type: String,
    pub bucket_name: Option<String>,
}

/// Default storage type when the source row does not name one.
pub const DEFAULT_STORAGE_TYPE: &str = "file_server";

/// A document ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDocument {
    pub id: String,
    pub title: Option<String>,
    pub filename: String,
    pub file_extension: Option<String>,
    pub mime_type: Option<String>,
    pub upload_date: DateTime<Utc>,
    pub uploaded_by: String,
    pub status: DocumentStatus,
    pub metadata: DocumentMetadata,
    pub tags: Vec<String>,
    pub permissions: Permissions,
    pub file_location: FileLocation,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CanonicalDocument {
    /// Generate a fresh document ID.
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Whether the tag set contains `tag` (tags are stored uppercased).
    pub fn has_tag(&self, tag: &str) -> bool {
        let tag = tag.trim().to_uppercase();
        self.tags.iter().any(|t| *t == tag)
    }
}

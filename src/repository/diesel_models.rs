//! Diesel ORM models for database tables.
//!
//! JSON-shaped fields (metadata, tags, group refs, notification data) are
//! stored as TEXT and converted at the repository boundary.

use diesel::prelude::*;

use crate::schema;

/// Document record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::documents)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocumentRecord {
    pub id: String,
    pub dedup_key: String,
    pub title: Option<String>,
    pub filename: String,
    pub file_extension: Option<String>,
    pub mime_type: Option<String>,
    pub upload_date: String,
    pub uploaded_by: String,
    pub status: String,
    pub metadata: String,
    pub tags: String,
    pub read_group_refs: String,
    pub write_group_refs: String,
    pub location_path: String,
    pub storage_type: String,
    pub bucket_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// New document for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::documents)]
pub struct NewDocument<'a> {
    pub id: &'a str,
    pub dedup_key: &'a str,
    pub title: Option<&'a str>,
    pub filename: &'a str,
    pub file_extension: Option<&'a str>,
    pub mime_type: Option<&'a str>,
    pub upload_date: String,
    pub uploaded_by: &'a str,
    pub status: &'a str,
    pub metadata: String,
    pub tags: String,
    pub read_group_refs: String,
    pub write_group_refs: String,
    pub location_path: &'a str,
    pub storage_type: &'a str,
    pub bucket_name: Option<&'a str>,
    pub created_at: String,
    pub updated_at: String,
}

/// Notification record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::notifications)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct NotificationRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub category: String,
    pub data: String,
    pub priority: String,
    pub read_at: Option<String>,
    pub expires_at: String,
    pub created_at: String,
}

/// New notification for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::notifications)]
pub struct NewNotificationRecord<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub kind: &'a str,
    pub category: &'a str,
    pub data: String,
    pub priority: &'a str,
    pub read_at: Option<String>,
    pub expires_at: String,
    pub created_at: String,
}

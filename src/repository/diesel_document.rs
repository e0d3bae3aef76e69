//! Diesel-based document store for SQLite.
//!
//! The `dedup_key` column carries a unique index and is filled from
//! `DedupKey::for_document`, so the store's uniqueness constraint and the
//! pipeline's duplicate checks agree on identity.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};

use super::diesel_models::{DocumentRecord, NewDocument};
use super::diesel_pool::{AsyncSqliteConnection, AsyncSqlitePool};
use super::util::{classify_insert_error, unavailable};
use super::{parse_datetime, BulkInsertReport, DocumentStore, RecordFailure, StoreResult};
use crate::import::DedupKey;
use crate::models::{
    CanonicalDocument, DocumentMetadata, DocumentStatus, FileLocation, Permissions,
};
use crate::schema::documents;

/// Convert a database record to a domain model.
impl From<DocumentRecord> for CanonicalDocument {
    fn from(record: DocumentRecord) -> Self {
        CanonicalDocument {
            id: record.id,
            title: record.title,
            filename: record.filename,
            file_extension: record.file_extension,
            mime_type: record.mime_type,
            upload_date: parse_datetime(&record.upload_date),
            uploaded_by: record.uploaded_by,
            status: DocumentStatus::from_str(&record.status),
            metadata: serde_json::from_str::<DocumentMetadata>(&record.metadata)
                .unwrap_or_default(),
            tags: serde_json::from_str(&record.tags).unwrap_or_default(),
            permissions: Permissions {
                read_group_refs: serde_json::from_str(&record.read_group_refs).unwrap_or_default(),
                write_group_refs: serde_json::from_str(&record.write_group_refs)
                    .unwrap_or_default(),
            },
            file_location: FileLocation {
                path: record.location_path,
                storage_type: record.storage_type,
                bucket_name: record.bucket_name,
            },
            created_at: parse_datetime(&record.created_at),
            updated_at: parse_datetime(&record.updated_at),
        }
    }
}

impl<'a> NewDocument<'a> {
    fn from_document(doc: &'a CanonicalDocument, key: &'a DedupKey) -> StoreResult<Self> {
        Ok(NewDocument {
            id: &doc.id,
            dedup_key: key.as_str(),
            title: doc.title.as_deref(),
            filename: &doc.filename,
            file_extension: doc.file_extension.as_deref(),
            mime_type: doc.mime_type.as_deref(),
            upload_date: doc.upload_date.to_rfc3339(),
            uploaded_by: &doc.uploaded_by,
            status: doc.status.as_str(),
            metadata: serde_json::to_string(&doc.metadata)?,
            tags: serde_json::to_string(&doc.tags)?,
            read_group_refs: serde_json::to_string(&doc.permissions.read_group_refs)?,
            write_group_refs: serde_json::to_string(&doc.permissions.write_group_refs)?,
            location_path: &doc.file_location.path,
            storage_type: &doc.file_location.storage_type,
            bucket_name: doc.file_location.bucket_name.as_deref(),
            created_at: doc.created_at.to_rfc3339(),
            updated_at: doc.updated_at.to_rfc3339(),
        })
    }
}

/// Diesel-based document store with compile-time query checking.
#[derive(Clone)]
pub struct DieselDocumentStore {
    pool: AsyncSqlitePool,
}

impl DieselDocumentStore {
    /// Create a new store with an existing pool.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    async fn insert_with(
        conn: &mut AsyncSqliteConnection,
        doc: &CanonicalDocument,
    ) -> StoreResult<()> {
        let key = DedupKey::for_document(doc);
        let row = NewDocument::from_document(doc, &key)?;
        diesel::insert_into(documents::table)
            .values(&row)
            .execute(conn)
            .await
            .map_err(|e| classify_insert_error(e, &key))?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for DieselDocumentStore {
    async fn existing_keys(&self, keys: &[DedupKey]) -> StoreResult<HashSet<DedupKey>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }
        let mut conn = self.pool.get().await.map_err(unavailable)?;

        let wanted: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        let found: Vec<String> = documents::table
            .filter(documents::dedup_key.eq_any(wanted))
            .select(documents::dedup_key)
            .load(&mut conn)
            .await?;

        Ok(found.into_iter().map(DedupKey::from_stored).collect())
    }

    async fn insert_many(&self, docs: &[CanonicalDocument]) -> StoreResult<BulkInsertReport> {
        let mut report = BulkInsertReport::default();
        if docs.is_empty() {
            return Ok(report);
        }

        let mut conn = self.pool.get().await.map_err(unavailable)?;

        // SQLite keeps the transaction open when a single INSERT hits a
        // constraint, so one bad record does not discard the others.
        conn.batch_execute("BEGIN IMMEDIATE")
            .await
            .map_err(unavailable)?;

        for (index, doc) in docs.iter().enumerate() {
            match Self::insert_with(&mut conn, doc).await {
                Ok(()) => report.inserted += 1,
                Err(error) => report.failures.push(RecordFailure {
                    index,
                    key: DedupKey::for_document(doc),
                    error,
                }),
            }
        }

        if let Err(e) = conn.batch_execute("COMMIT").await {
            let _ = conn.batch_execute("ROLLBACK").await;
            return Err(unavailable(format!("bulk insert commit failed: {}", e)));
        }

        Ok(report)
    }

    async fn insert_one(&self, doc: &CanonicalDocument) -> StoreResult<()> {
        let mut conn = self.pool.get().await.map_err(unavailable)?;
        Self::insert_with(&mut conn, doc).await
    }

    async fn update_permissions(
        &self,
        id: &str,
        permissions: &Permissions,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut conn = self.pool.get().await.map_err(unavailable)?;

        let read = serde_json::to_string(&permissions.read_group_refs)?;
        let write = serde_json::to_string(&permissions.write_group_refs)?;

        let rows = diesel::update(documents::table.find(id))
            .set((
                documents::read_group_refs.eq(read),
                documents::write_group_refs.eq(write),
                documents::updated_at.eq(now.to_rfc3339()),
            ))
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }

    async fn get_by_key(&self, key: &DedupKey) -> StoreResult<Option<CanonicalDocument>> {
        let mut conn = self.pool.get().await.map_err(unavailable)?;

        let record = documents::table
            .filter(documents::dedup_key.eq(key.as_str()))
            .select(DocumentRecord::as_select())
            .first::<DocumentRecord>(&mut conn)
            .await
            .optional()?;

        Ok(record.map(CanonicalDocument::from))
    }

    async fn count(&self) -> StoreResult<u64> {
        let mut conn = self.pool.get().await.map_err(unavailable)?;

        use diesel::dsl::count_star;
        let count: i64 = documents::table
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_STORAGE_TYPE;
    use tempfile::tempdir;

    async fn setup_test_db() -> (AsyncSqlitePool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let pool = AsyncSqlitePool::from_path(&db_path);
        pool.init_schema().await.unwrap();
        (pool, dir)
    }

    fn doc(filename: &str, path: &str) -> CanonicalDocument {
        let now = Utc::now();
        CanonicalDocument {
            id: CanonicalDocument::new_id(),
            title: Some("Title".into()),
            filename: filename.into(),
            file_extension: Some("pdf".into()),
            mime_type: Some("application/pdf".into()),
            upload_date: now,
            uploaded_by: "user-1".into(),
            status: DocumentStatus::Active,
            metadata: DocumentMetadata {
                document_type: Some("LEI".into()),
                document_year: 2020,
                additional: [("orgao".to_string(), "SEFAZ".to_string())].into(),
            },
            tags: vec!["ADLP".into()],
            permissions: Permissions::new(["r1"], ["w1"]),
            file_location: FileLocation {
                path: path.into(),
                storage_type: DEFAULT_STORAGE_TYPE.into(),
                bucket_name: None,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch_round_trip() {
        let (pool, _dir) = setup_test_db().await;
        let store = DieselDocumentStore::new(pool);

        let original = doc("a.pdf", "/docs/a.pdf");
        store.insert_one(&original).await.unwrap();

        let fetched = store
            .get_by_key(&DedupKey::for_document(&original))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, original.id);
        assert_eq!(fetched.metadata, original.metadata);
        assert_eq!(fetched.permissions, original.permissions);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_bulk_insert_reports_unique_violations() {
        let (pool, _dir) = setup_test_db().await;
        let store = DieselDocumentStore::new(pool);

        store.insert_one(&doc("b.pdf", "/docs/b.pdf")).await.unwrap();

        // Same identity with different case must collide on the unique index.
        let batch = vec![
            doc("a.pdf", "/docs/a.pdf"),
            doc("B.PDF", "/DOCS/b.pdf"),
            doc("c.pdf", "/docs/c.pdf"),
        ];
        let report = store.insert_many(&batch).await.unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(report.failures[0].error.is_duplicate());
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_existing_keys_returns_only_stored() {
        let (pool, _dir) = setup_test_db().await;
        let store = DieselDocumentStore::new(pool);

        let stored = doc("a.pdf", "/docs/a.pdf");
        store.insert_one(&stored).await.unwrap();

        let keys = vec![
            DedupKey::new("A.pdf", "/Docs/A.pdf"),
            DedupKey::new("z.pdf", "/docs/z.pdf"),
        ];
        let existing = store.existing_keys(&keys).await.unwrap();
        assert_eq!(existing.len(), 1);
        assert!(existing.contains(&DedupKey::for_document(&stored)));
    }

    #[tokio::test]
    async fn test_update_permissions() {
        let (pool, _dir) = setup_test_db().await;
        let store = DieselDocumentStore::new(pool);

        let original = doc("a.pdf", "/docs/a.pdf");
        store.insert_one(&original).await.unwrap();

        let perms = Permissions::new(["r2", "r3"], Vec::<String>::new());
        assert!(store
            .update_permissions(&original.id, &perms, Utc::now())
            .await
            .unwrap());
        assert!(!store
            .update_permissions("missing", &perms, Utc::now())
            .await
            .unwrap());

        let fetched = store
            .get_by_key(&DedupKey::for_document(&original))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.permissions, perms);
    }
}

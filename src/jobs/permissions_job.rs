//! Batch replacement of document permissions.

use std::time::Instant;

use chrono::Utc;

use super::JobContext;
use crate::models::NotificationType;
use crate::work_queue::PermissionsTask;

/// Counts from one permission update run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PermissionUpdateStats {
    pub updated: usize,
    pub failed: usize,
}

/// Replace the permissions of every listed document, then notify the user.
///
/// Missing documents and store errors count as failures; the run continues.
pub async fn run(ctx: &JobContext, task: &PermissionsTask) -> PermissionUpdateStats {
    let started = Instant::now();
    let mut stats = PermissionUpdateStats::default();

    tracing::info!(
        "Updating permissions of {} documents for {}",
        task.document_ids.len(),
        task.user_id
    );

    for id in &task.document_ids {
        match ctx
            .store
            .update_permissions(id, &task.permissions, Utc::now())
            .await
        {
            Ok(true) => stats.updated += 1,
            Ok(false) => {
                tracing::warn!("Document {} not found", id);
                stats.failed += 1;
            }
            Err(e) => {
                tracing::error!("Failed to update permissions of {}: {}", id, e);
                stats.failed += 1;
            }
        }
    }

    // Sub-second runs are reported as one second.
    let mut duration = started.elapsed().as_secs_f64();
    if !task.document_ids.is_empty() && duration < 1.0 {
        duration = 1.0;
    }

    let kind = if stats.failed > 0 {
        NotificationType::Warning
    } else {
        NotificationType::Success
    };

    ctx.notifications
        .job_completed(
            &task.user_id,
            "Permission Update",
            stats.updated,
            stats.failed,
            duration,
            kind,
            serde_json::json!({
                "document_ids": task.document_ids,
                "total_documents": task.document_ids.len(),
            }),
        )
        .await;

    stats
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cache::InMemoryTransientStore;
    use crate::config::ImportSettings;
    use crate::import::testing::document;
    use crate::models::Permissions;
    use crate::notify::InMemoryNotificationSink;
    use crate::repository::{DocumentStore, InMemoryDocumentStore};
    use crate::work_queue::LocalTaskQueue;

    fn context(store: &InMemoryDocumentStore, sink: &InMemoryNotificationSink) -> JobContext {
        JobContext::new(
            Arc::new(store.clone()),
            Arc::new(LocalTaskQueue::new()),
            Arc::new(InMemoryTransientStore::new()),
            Arc::new(sink.clone()),
            ImportSettings::default(),
        )
    }

    #[tokio::test]
    async fn test_updates_every_listed_document() {
        let store = InMemoryDocumentStore::new();
        let sink = InMemoryNotificationSink::new();
        let a = document("A.PDF", "docs/a.pdf");
        let b = document("B.PDF", "docs/b.pdf");
        store.insert_many(&[a.clone(), b.clone()]).await.unwrap();

        let task = PermissionsTask {
            user_id: "u1".into(),
            document_ids: vec![a.id.clone(), b.id.clone()],
            permissions: Permissions::new(["g9"], ["g10"]),
        };
        let stats = run(&context(&store, &sink), &task).await;

        assert_eq!(stats, PermissionUpdateStats { updated: 2, failed: 0 });
        for doc in store.all().await {
            assert_eq!(doc.permissions.read_group_refs, vec!["g9"]);
            assert_eq!(doc.permissions.write_group_refs, vec!["g10"]);
        }

        let notes = sink.all().await;
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Job Completed: Permission Update");
        assert_eq!(notes[0].kind, NotificationType::Success);
        assert_eq!(notes[0].data["total_documents"], 2);
        assert_eq!(notes[0].data["duration"], 1.0);
    }

    #[tokio::test]
    async fn test_missing_documents_are_counted_as_failures() {
        let store = InMemoryDocumentStore::new();
        let sink = InMemoryNotificationSink::new();
        let a = document("A.PDF", "docs/a.pdf");
        store.insert_one(&a).await.unwrap();

        let task = PermissionsTask {
            user_id: "u1".into(),
            document_ids: vec![a.id.clone(), "missing".into()],
            permissions: Permissions::new(["g1"], Vec::<String>::new()),
        };
        let stats = run(&context(&store, &sink), &task).await;

        assert_eq!(stats, PermissionUpdateStats { updated: 1, failed: 1 });
        let notes = sink.all().await;
        assert_eq!(notes[0].kind, NotificationType::Warning);
        assert_eq!(notes[0].data["error_count"], 1);
    }
}

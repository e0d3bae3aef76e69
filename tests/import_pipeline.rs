//! End-to-end tests for the import pipeline.
//!
//! Jobs run against in-memory collaborators. `FlakyStore` injects store
//! failures, `SlowStore` stalls bulk inserts past a task's timeout,
//! `DownCache` is a transient store that is always unavailable, and
//! `RecordingTaskQueue` captures dispatched tasks without running them.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::Mutex;

use docimport::cache::{CacheError, CacheResult, InMemoryTransientStore, TransientStore};
use docimport::config::ImportSettings;
use docimport::import::{
    process_rows, progress_key, DedupKey, ImportContext, ImportError, ImportOutcome,
    ImportVariant, ParsedRow, ProgressSnapshot, RawRecord, SkipReason,
};
use docimport::jobs::chunk_job;
use docimport::jobs::import_job::{self, ImportJobResult};
use docimport::jobs::{JobContext, JobRunner};
use docimport::models::{CanonicalDocument, NotificationType, Permissions};
use docimport::notify::InMemoryNotificationSink;
use docimport::repository::{
    BulkInsertReport, DocumentStore, InMemoryDocumentStore, RecordFailure, StoreError,
    StoreResult,
};
use docimport::work_queue::runner::execute;
use docimport::work_queue::{
    ImportFileTask, LocalTaskQueue, QueuedTask, Task, TaskQueue, WorkQueueError, WorkerPool,
};

const HEADER: &str = "filename,file_location_path,title,tags,metadata_document_type";

/// Store wrapper that fails on demand.
#[derive(Clone, Default)]
struct FlakyStore {
    inner: InMemoryDocumentStore,
    fail_existing: bool,
    fail_bulk: bool,
    /// Filenames rejected inside an otherwise successful bulk insert.
    reject: HashSet<String>,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn existing_keys(&self, keys: &[DedupKey]) -> StoreResult<HashSet<DedupKey>> {
        if self.fail_existing {
            return Err(StoreError::Unavailable("existence query down".into()));
        }
        self.inner.existing_keys(keys).await
    }

    async fn insert_many(&self, docs: &[CanonicalDocument]) -> StoreResult<BulkInsertReport> {
        if self.fail_bulk {
            return Err(StoreError::Unavailable("bulk insert down".into()));
        }

        let (rejected, accepted): (Vec<_>, Vec<_>) = docs
            .iter()
            .enumerate()
            .partition(|(_, d)| self.reject.contains(&d.filename));

        let accepted: Vec<CanonicalDocument> =
            accepted.into_iter().map(|(_, d)| d.clone()).collect();
        let mut report = self.inner.insert_many(&accepted).await?;
        for (index, doc) in rejected {
            report.failures.push(RecordFailure {
                index,
                key: DedupKey::for_document(doc),
                error: StoreError::Rejected("value too long".into()),
            });
        }
        Ok(report)
    }

    async fn insert_one(&self, doc: &CanonicalDocument) -> StoreResult<()> {
        self.inner.insert_one(doc).await
    }

    async fn update_permissions(
        &self,
        id: &str,
        permissions: &Permissions,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.update_permissions(id, permissions, now).await
    }

    async fn get_by_key(&self, key: &DedupKey) -> StoreResult<Option<CanonicalDocument>> {
        self.inner.get_by_key(key).await
    }

    async fn count(&self) -> StoreResult<u64> {
        self.inner.count().await
    }
}

/// Store whose bulk inserts stall well past any test timeout.
#[derive(Clone, Default)]
struct SlowStore {
    inner: InMemoryDocumentStore,
    /// Bulk inserts let through before every later one stalls.
    passes: usize,
    /// When non-empty, only bulk inserts touching these filenames stall.
    stall_on: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DocumentStore for SlowStore {
    async fn existing_keys(&self, keys: &[DedupKey]) -> StoreResult<HashSet<DedupKey>> {
        self.inner.existing_keys(keys).await
    }

    async fn insert_many(&self, docs: &[CanonicalDocument]) -> StoreResult<BulkInsertReport> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let stall = if self.stall_on.is_empty() {
            call >= self.passes
        } else {
            docs.iter().any(|d| self.stall_on.contains(&d.filename))
        };
        if stall {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        self.inner.insert_many(docs).await
    }

    async fn insert_one(&self, doc: &CanonicalDocument) -> StoreResult<()> {
        self.inner.insert_one(doc).await
    }

    async fn update_permissions(
        &self,
        id: &str,
        permissions: &Permissions,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.inner.update_permissions(id, permissions, now).await
    }

    async fn get_by_key(&self, key: &DedupKey) -> StoreResult<Option<CanonicalDocument>> {
        self.inner.get_by_key(key).await
    }

    async fn count(&self) -> StoreResult<u64> {
        self.inner.count().await
    }
}

/// Transient store that is always unavailable.
struct DownCache;

#[async_trait]
impl TransientStore for DownCache {
    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl: Duration) -> CacheResult<()> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn hash_increment(
        &self,
        _key: &str,
        _deltas: &[(&str, i64)],
        _ttl: Duration,
    ) -> CacheResult<HashMap<String, i64>> {
        Err(CacheError::Unavailable("down".into()))
    }

    async fn delete(&self, _key: &str) -> CacheResult<()> {
        Err(CacheError::Unavailable("down".into()))
    }
}

/// Queue that records tasks and never runs them.
#[derive(Clone, Default)]
struct RecordingTaskQueue {
    tasks: Arc<Mutex<Vec<(String, Task)>>>,
    /// Refuse every enqueue once this many tasks were recorded.
    capacity: Option<usize>,
}

#[async_trait]
impl TaskQueue for RecordingTaskQueue {
    async fn enqueue(&self, queue: &str, task: Task) -> Result<String, WorkQueueError> {
        let mut tasks = self.tasks.lock().await;
        if self.capacity.is_some_and(|max| tasks.len() >= max) {
            return Err(WorkQueueError::retryable("queue full"));
        }
        tasks.push((queue.to_string(), task));
        Ok(format!("task-{}", tasks.len()))
    }
}

struct Harness {
    dir: TempDir,
    sink: InMemoryNotificationSink,
    cache: Arc<dyn TransientStore>,
    ctx: JobContext,
}

impl Harness {
    fn new(store: Arc<dyn DocumentStore>, queue: Arc<dyn TaskQueue>, settings: ImportSettings) -> Self {
        Self::with_cache(store, queue, Arc::new(InMemoryTransientStore::new()), settings)
    }

    fn with_cache(
        store: Arc<dyn DocumentStore>,
        queue: Arc<dyn TaskQueue>,
        cache: Arc<dyn TransientStore>,
        settings: ImportSettings,
    ) -> Self {
        let sink = InMemoryNotificationSink::new();
        let ctx = JobContext::new(
            store,
            queue,
            cache.clone(),
            Arc::new(sink.clone()),
            settings,
        );
        Self {
            dir: tempfile::tempdir().unwrap(),
            sink,
            cache,
            ctx,
        }
    }

    fn direct(store: Arc<dyn DocumentStore>) -> Self {
        Self::new(store, Arc::new(RecordingTaskQueue::default()), ImportSettings::default())
    }

    fn write_csv(&self, name: &str, rows: &[&str]) -> PathBuf {
        let path = self.dir.path().join(name);
        let mut contents = String::from(HEADER);
        for row in rows {
            contents.push('\n');
            contents.push_str(row);
        }
        contents.push('\n');
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn task(&self, path: &Path) -> ImportFileTask {
        ImportFileTask {
            file_path: path.to_path_buf(),
            context: context(),
            variant: ImportVariant::Optimized,
        }
    }

    async fn import(&self, path: &Path) -> ImportJobResult {
        import_job::run(&self.ctx, &self.task(path), true).await.unwrap()
    }

    /// Run every queued task through a worker pool until the queue drains.
    async fn drain(&self, queue: &LocalTaskQueue, tries: u32) {
        let runner = Arc::new(JobRunner::new(self.ctx.clone()));
        let workers = WorkerPool::new(queue.clone(), runner, 4, tries)
            .spawn()
            .await
            .unwrap();
        queue.wait_idle().await;
        workers.abort();
    }
}

fn context() -> ImportContext {
    ImportContext::new("user-1", Permissions::new(Vec::<String>::new(), Vec::<String>::new()))
}

fn chunked_settings(chunk_size: usize) -> ImportSettings {
    ImportSettings {
        chunk_threshold_bytes: 0,
        chunk_size,
        ..ImportSettings::default()
    }
}

/// Chunked settings where a stalled chunk times out after a second, for good.
fn impatient_chunked_settings(chunk_size: usize) -> ImportSettings {
    ImportSettings {
        chunk_timeout_secs: 1,
        tries: 1,
        ..chunked_settings(chunk_size)
    }
}

fn rows(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| format!("{n},/{n},,,")).collect()
}

fn direct_outcome(result: ImportJobResult) -> ImportOutcome {
    match result {
        ImportJobResult::Direct(outcome) => outcome,
        other => panic!("expected a direct run, got {:?}", other),
    }
}

fn record(line: u64, filename: &str, path: &str) -> ParsedRow {
    ParsedRow::Record(RawRecord {
        line,
        fields: [
            ("filename".to_string(), filename.to_string()),
            ("file_location_path".to_string(), path.to_string()),
        ]
        .into_iter()
        .collect(),
    })
}

#[tokio::test]
async fn test_example_file_imports_with_success() {
    let store = InMemoryDocumentStore::new();
    let h = Harness::direct(Arc::new(store.clone()));
    let path = h.write_csv("example.csv", &["F1,/p/1,,,", "F1,/p/1,,,", "F2,/p/2,,,"]);

    let outcome = direct_outcome(h.import(&path).await);

    assert_eq!(outcome.imported, 2);
    assert_eq!(outcome.skipped, 1);
    assert!(matches!(outcome.reasons[0], SkipReason::DuplicateInBatch { .. }));
    assert_eq!(store.count().await.unwrap(), 2);
    assert!(!path.exists());

    let notes = h.sink.all().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Job Completed: Document Import");
    assert_eq!(notes[0].kind, NotificationType::Success);
    assert_eq!(notes[0].data["success_count"], 2);
    assert_eq!(notes[0].data["error_count"], 1);
}

#[tokio::test]
async fn test_every_row_is_counted() {
    let store = InMemoryDocumentStore::new();
    let h = Harness::direct(Arc::new(store.clone()));
    let path = h.write_csv(
        "mixed.csv",
        &[
            "a.pdf,/docs/a.pdf,A,,",
            ",/docs/missing.pdf,Missing,,",
            "b.pdf,/docs/b.pdf",
            "c.pdf,/docs/c.pdf,C,,",
            ",,,,",
        ],
    );

    let outcome = direct_outcome(h.import(&path).await);

    // Blank rows are not data rows.
    assert_eq!(outcome.total(), 4);
    assert_eq!(outcome.imported, 2);
    assert_eq!(outcome.skipped, 2);
    assert!(outcome
        .reasons
        .iter()
        .any(|r| matches!(r, SkipReason::MissingField { field, .. } if field == "filename")));
    assert!(outcome
        .reasons
        .iter()
        .any(|r| matches!(r, SkipReason::ColumnMismatch { .. })));

    let notes = h.sink.all().await;
    assert_eq!(notes[0].kind, NotificationType::Warning);
}

#[tokio::test]
async fn test_first_duplicate_in_batch_wins() {
    let store = InMemoryDocumentStore::new();
    let h = Harness::direct(Arc::new(store.clone()));
    let path = h.write_csv(
        "dups.csv",
        &[
            "report.pdf,Docs/Report.PDF,First,,",
            "REPORT.PDF,docs/report.pdf,Second,,",
            "Report.pdf,DOCS/REPORT.pdf,Third,,",
        ],
    );

    let outcome = direct_outcome(h.import(&path).await);

    assert_eq!(outcome.imported, 1);
    assert_eq!(outcome.skipped, 2);
    assert!(outcome
        .reasons
        .iter()
        .all(|r| matches!(r, SkipReason::DuplicateInBatch { .. })));

    let stored = store.all().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title.as_deref(), Some("First"));
}

#[tokio::test]
async fn test_rerun_imports_nothing_new() {
    let store = InMemoryDocumentStore::new();
    let h = Harness::direct(Arc::new(store.clone()));
    let rows = ["a.pdf,/a.pdf,,,", "b.pdf,/b.pdf,,,", "c.pdf,/c.pdf,,,"];

    let first = direct_outcome(h.import(&h.write_csv("first.csv", &rows)).await);
    let second = direct_outcome(h.import(&h.write_csv("second.csv", &rows)).await);

    assert_eq!(first.imported, 3);
    assert_eq!(second.imported, 0);
    assert_eq!(second.skipped, first.imported);
    assert!(second
        .reasons
        .iter()
        .all(|r| matches!(r, SkipReason::AlreadyExists { .. })));
    assert_eq!(store.count().await.unwrap(), 3);

    // Duplicates of stored documents are not errors.
    let notes = h.sink.all().await;
    assert_eq!(notes[1].kind, NotificationType::Success);
}

#[tokio::test]
async fn test_rejected_record_is_skipped_and_others_persist() {
    let store = FlakyStore {
        reject: HashSet::from(["b.pdf".to_string()]),
        ..FlakyStore::default()
    };
    let h = Harness::direct(Arc::new(store.clone()));
    let path = h.write_csv("partial.csv", &["a.pdf,/a.pdf,,,", "b.pdf,/b.pdf,,,", "c.pdf,/c.pdf,,,"]);

    let outcome = direct_outcome(h.import(&path).await);

    assert_eq!(outcome.imported, 2);
    assert_eq!(outcome.skipped, 1);
    assert!(matches!(
        &outcome.reasons[0],
        SkipReason::WriteFailed { key, .. } if key.as_str().starts_with("B.PDF")
    ));

    let names: HashSet<String> = store.inner.all().await.into_iter().map(|d| d.filename).collect();
    assert_eq!(names, HashSet::from(["a.pdf".to_string(), "c.pdf".to_string()]));
    assert_eq!(h.sink.all().await[0].kind, NotificationType::Warning);
}

#[tokio::test]
async fn test_failed_bulk_insert_falls_back_to_single_inserts() {
    let store = FlakyStore {
        fail_bulk: true,
        ..FlakyStore::default()
    };
    let h = Harness::direct(Arc::new(store.clone()));
    let path = h.write_csv("fallback.csv", &["a.pdf,/a.pdf,,,", "b.pdf,/b.pdf,,,"]);

    let outcome = direct_outcome(h.import(&path).await);

    assert_eq!(outcome.imported, 2);
    assert_eq!(outcome.skipped, 0);
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_failed_existence_query_still_rejects_stored_keys() {
    let store = FlakyStore {
        fail_existing: true,
        ..FlakyStore::default()
    };
    let h = Harness::direct(Arc::new(store.clone()));

    direct_outcome(h.import(&h.write_csv("one.csv", &["a.pdf,/a.pdf,,,"])).await);
    let outcome = direct_outcome(
        h.import(&h.write_csv("two.csv", &["a.pdf,/a.pdf,,,", "b.pdf,/b.pdf,,,"]))
            .await,
    );

    assert_eq!(outcome.imported, 1);
    assert_eq!(outcome.skipped, 1);
    assert!(matches!(outcome.reasons[0], SkipReason::AlreadyExists { .. }));
    assert_eq!(store.count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_path_and_tags_are_normalized() {
    let store = InMemoryDocumentStore::new();
    let h = Harness::direct(Arc::new(store.clone()));
    let path = h.write_csv(
        "normalize.csv",
        &[r#"C.PDF,A\B\C.PDF,Decree,"urgent|Urgent| archive ",decreto"#],
    );

    direct_outcome(h.import(&path).await);

    let stored = store.all().await;
    assert_eq!(stored[0].file_location.path, "A/B/C.pdf");
    assert_eq!(stored[0].tags, vec!["URGENT", "ARCHIVE", "ADLP"]);
}

#[tokio::test]
async fn test_small_file_is_not_chunked() {
    let queue = RecordingTaskQueue::default();
    let h = Harness::new(
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(queue.clone()),
        ImportSettings::default(),
    );
    let path = h.write_csv("small.csv", &["a.pdf,/a.pdf,,,"]);

    assert!(matches!(h.import(&path).await, ImportJobResult::Direct(_)));
    assert!(queue.tasks.lock().await.is_empty());
}

#[tokio::test]
async fn test_large_file_dispatches_one_task_per_chunk() {
    let queue = RecordingTaskQueue::default();
    let store = InMemoryDocumentStore::new();
    let h = Harness::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        chunked_settings(4),
    );
    let rows: Vec<String> = (0..10).map(|i| format!("f{i}.pdf,/f{i}.pdf,,,")).collect();
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let path = h.write_csv("large.csv", &rows);

    let result = h.import(&path).await;

    let ImportJobResult::Dispatched { run_id, total_chunks } = result else {
        panic!("expected a chunked run");
    };
    assert_eq!(total_chunks, 3);
    assert!(run_id.starts_with("import_"));
    assert!(!path.exists());
    // Nothing is written before a chunk worker runs.
    assert_eq!(store.count().await.unwrap(), 0);

    let tasks = queue.tasks.lock().await;
    let sizes: Vec<(usize, usize)> = tasks
        .iter()
        .map(|(queue_name, task)| {
            assert_eq!(queue_name, "documents");
            match task {
                Task::ProcessChunk(chunk) => (chunk.chunk_index, chunk.rows.len()),
                other => panic!("unexpected task {:?}", other),
            }
        })
        .collect();
    assert_eq!(sizes, vec![(0, 4), (1, 4), (2, 2)]);

    let notes = h.sink.all().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Import Processing Started");
    assert_eq!(notes[0].data["total_chunks"], 3);
}

#[tokio::test]
async fn test_chunked_run_without_rows_reports_immediately() {
    let queue = RecordingTaskQueue::default();
    let h = Harness::new(
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(queue.clone()),
        chunked_settings(4),
    );
    let path = h.write_csv("empty.csv", &[]);

    let result = h.import(&path).await;

    assert!(matches!(
        result,
        ImportJobResult::Dispatched { total_chunks: 0, .. }
    ));
    assert!(queue.tasks.lock().await.is_empty());

    let notes = h.sink.all().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Job Completed: Document Import");
    assert_eq!(notes[0].kind, NotificationType::Success);
    assert_eq!(notes[0].data["total_processed"], 0);
}

#[tokio::test]
async fn test_concurrent_batches_race_on_one_key() {
    let store = InMemoryDocumentStore::new();
    let ctx = context();

    let (left, right) = tokio::join!(
        process_rows(vec![record(2, "race.pdf", "/race.pdf")], &ctx, &store),
        process_rows(vec![record(9, "RACE.PDF", "/Race.pdf")], &ctx, &store),
    );

    assert_eq!(left.imported + right.imported, 1);
    assert_eq!(left.skipped + right.skipped, 1);
    let loser = if left.skipped == 1 { &left } else { &right };
    assert!(matches!(loser.reasons[0], SkipReason::AlreadyExists { .. }));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_chunked_run_through_worker_pool_reports_once() {
    let store = InMemoryDocumentStore::new();
    let queue = LocalTaskQueue::new();
    let h = Harness::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        chunked_settings(3),
    );
    let runner = Arc::new(JobRunner::new(h.ctx.clone()));
    let workers = WorkerPool::new(queue.clone(), runner, 4, 3)
        .spawn()
        .await
        .unwrap();

    let mut rows: Vec<String> = (1..=8).map(|i| format!("f{i}.pdf,/f{i}.pdf,,,")).collect();
    rows.insert(4, ",/nameless.pdf,,,".to_string());
    rows.push("f1.pdf,/f1.pdf,,,".to_string());
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let path = h.write_csv("pool.csv", &rows);

    queue
        .enqueue(
            "default",
            Task::ImportFile(ImportFileTask {
                file_path: path.clone(),
                context: context(),
                variant: ImportVariant::Optimized,
            }),
        )
        .await
        .unwrap();
    queue.wait_idle().await;
    workers.abort();

    assert_eq!(store.count().await.unwrap(), 8);

    let notes = h.sink.all().await;
    let started: Vec<_> = notes
        .iter()
        .filter(|n| n.title == "Import Processing Started")
        .collect();
    let completed: Vec<_> = notes
        .iter()
        .filter(|n| n.title == "Job Completed: Document Import")
        .collect();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].data["total_chunks"], 4);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].kind, NotificationType::Warning);
    assert_eq!(completed[0].data["success_count"], 8);
    assert_eq!(completed[0].data["error_count"], 2);
    assert_eq!(completed[0].data["failed_chunks"], 0);

    let progress = h.cache.get(&progress_key("user-1")).await.unwrap().unwrap();
    let snapshot: ProgressSnapshot = serde_json::from_str(&progress).unwrap();
    // Chunks publish concurrently, so the last write may not be the final tally.
    assert!(snapshot.imported <= 8);
    assert!(snapshot.imported + snapshot.skipped <= 10);
}

#[tokio::test]
async fn test_unreadable_file_reports_failure() {
    let h = Harness::direct(Arc::new(InMemoryDocumentStore::new()));
    let task = ImportFileTask {
        file_path: h.dir.path().join("gone.csv"),
        context: context(),
        variant: ImportVariant::Optimized,
    };

    let result = import_job::run(&h.ctx, &task, false).await;

    assert!(result.is_err());
    // Fatal errors are reported even before the last attempt.
    let notes = h.sink.all().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Import Failed");
    assert_eq!(notes[0].kind, NotificationType::Error);
}

#[tokio::test]
async fn test_timed_out_import_reports_batches_already_written() {
    let store = SlowStore {
        passes: 2,
        ..SlowStore::default()
    };
    let settings = ImportSettings {
        optimized_batch_size: 1,
        job_timeout_secs: 1,
        tries: 1,
        ..ImportSettings::default()
    };
    let h = Harness::new(
        Arc::new(store.clone()),
        Arc::new(RecordingTaskQueue::default()),
        settings,
    );
    let names = rows(&["a.pdf", "b.pdf", "c.pdf"]);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let path = h.write_csv("slow.csv", &names);

    let runner = JobRunner::new(h.ctx.clone());
    let task = QueuedTask::new("default", Task::ImportFile(h.task(&path)));
    execute(&runner, task, 1).await;

    assert_eq!(store.count().await.unwrap(), 2);

    let notes = h.sink.all().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Import Failed");
    assert_eq!(notes[0].kind, NotificationType::Error);
    assert_eq!(notes[0].data["success_count"], 2);
    assert!(notes[0].message.contains("Imported: 2"));
}

#[tokio::test]
async fn test_stalled_chunk_counts_as_failed_and_run_warns() {
    let store = SlowStore {
        stall_on: HashSet::from(["f3.pdf".to_string()]),
        ..SlowStore::default()
    };
    let queue = LocalTaskQueue::new();
    let h = Harness::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        impatient_chunked_settings(2),
    );
    let names = rows(&["f1.pdf", "f2.pdf", "f3.pdf", "f4.pdf"]);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let path = h.write_csv("stall.csv", &names);

    queue
        .enqueue("default", Task::ImportFile(h.task(&path)))
        .await
        .unwrap();
    h.drain(&queue, 1).await;

    assert_eq!(store.count().await.unwrap(), 2);

    let notes = h.sink.all().await;
    let completed: Vec<_> = notes
        .iter()
        .filter(|n| n.title == "Job Completed: Document Import")
        .collect();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].kind, NotificationType::Warning);
    assert_eq!(completed[0].data["success_count"], 2);
    assert_eq!(completed[0].data["error_count"], 2);
    assert_eq!(completed[0].data["failed_chunks"], 1);
    assert!(notes.iter().all(|n| n.title != "Import Failed"));
}

#[tokio::test]
async fn test_run_with_every_chunk_failed_reports_import_failed() {
    let store = SlowStore::default();
    let queue = LocalTaskQueue::new();
    let h = Harness::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        impatient_chunked_settings(2),
    );
    let names = rows(&["f1.pdf", "f2.pdf", "f3.pdf"]);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let path = h.write_csv("doomed.csv", &names);

    queue
        .enqueue("default", Task::ImportFile(h.task(&path)))
        .await
        .unwrap();
    h.drain(&queue, 1).await;

    assert_eq!(store.count().await.unwrap(), 0);

    let notes = h.sink.all().await;
    let failed: Vec<_> = notes.iter().filter(|n| n.title == "Import Failed").collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].kind, NotificationType::Error);
    assert!(failed[0].message.contains("all 2 chunks failed"));
    assert_eq!(failed[0].data["error_count"], 3);
    assert!(notes
        .iter()
        .all(|n| n.title != "Job Completed: Document Import"));
}

#[tokio::test]
async fn test_chunked_run_continues_without_transient_store() {
    let store = InMemoryDocumentStore::new();
    let queue = RecordingTaskQueue::default();
    let h = Harness::with_cache(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        Arc::new(DownCache),
        chunked_settings(2),
    );
    let names = rows(&["f1.pdf", "f2.pdf", "f3.pdf"]);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let path = h.write_csv("offline.csv", &names);

    let result = h.import(&path).await;

    assert!(matches!(
        result,
        ImportJobResult::Dispatched { total_chunks: 2, .. }
    ));
    assert!(!path.exists());

    let chunks: Vec<_> = queue
        .tasks
        .lock()
        .await
        .iter()
        .map(|(_, task)| match task {
            Task::ProcessChunk(chunk) => chunk.clone(),
            other => panic!("unexpected task {:?}", other),
        })
        .collect();
    assert_eq!(chunks.len(), 2);
    for chunk in &chunks {
        chunk_job::run(&h.ctx, chunk).await.unwrap();
    }
    assert_eq!(store.count().await.unwrap(), 3);

    // Without a tally there is no run report, only the start notice.
    let notes = h.sink.all().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Import Processing Started");
    assert_eq!(notes[0].data["total_chunks"], 2);
}

#[tokio::test]
async fn test_empty_chunked_run_reports_without_transient_store() {
    let h = Harness::with_cache(
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(RecordingTaskQueue::default()),
        Arc::new(DownCache),
        chunked_settings(2),
    );
    let path = h.write_csv("offline-empty.csv", &[]);

    let result = h.import(&path).await;

    assert!(matches!(
        result,
        ImportJobResult::Dispatched { total_chunks: 0, .. }
    ));
    let notes = h.sink.all().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Job Completed: Document Import");
    assert_eq!(notes[0].kind, NotificationType::Success);
}

#[tokio::test]
async fn test_failed_dispatch_is_reported_once() {
    let store = InMemoryDocumentStore::new();
    let queue = RecordingTaskQueue {
        capacity: Some(1),
        ..RecordingTaskQueue::default()
    };
    let h = Harness::new(
        Arc::new(store.clone()),
        Arc::new(queue.clone()),
        chunked_settings(2),
    );
    let names = rows(&["f1.pdf", "f2.pdf", "f3.pdf"]);
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let path = h.write_csv("overflow.csv", &names);

    let result = import_job::run(&h.ctx, &h.task(&path), true).await;
    assert!(matches!(result, Err(ImportError::Queue(_))));

    // The chunk that made it onto the queue still runs, but cannot finish
    // the abandoned run.
    let chunk = match &queue.tasks.lock().await[0].1 {
        Task::ProcessChunk(chunk) => chunk.clone(),
        other => panic!("unexpected task {:?}", other),
    };
    chunk_job::run(&h.ctx, &chunk).await.unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    let notes = h.sink.all().await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title, "Import Failed");
}

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;
use uuid::Uuid;

use strongbox::config::LocalBackendConfig;
use strongbox::storage::LocalBackend;
use strongbox::{BlobBackend, Database, FolderLocks, Result, RetryConfig, StorageError};

/// Shared per-test fixture: a scratch sqlite file and a local blob root,
/// both inside one tempdir that lives as long as the fixture.
pub struct TestCtx {
    pub db: Database,
    pub backend: Arc<LocalBackend>,
    pub locks: Arc<FolderLocks>,
    pub retry: RetryConfig,
    pub blob_root: std::path::PathBuf,
    _tmp: tempfile::TempDir,
}

pub async fn setup() -> TestCtx {
    let tmp = tempfile::tempdir().expect("tempdir");
    let db_path = tmp.path().join("test.db");
    let blob_root = tmp.path().join("blobs");
    std::fs::create_dir_all(&blob_root).expect("blob root");

    let db = Database::new(db_path.to_str().expect("utf-8 path"))
        .await
        .expect("database");
    db.run_migrations().await.expect("migrations");

    let backend = Arc::new(LocalBackend::new(&LocalBackendConfig {
        root_path: blob_root.to_string_lossy().into_owned(),
    }));

    TestCtx {
        db,
        backend,
        locks: Arc::new(FolderLocks::new()),
        retry: RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(5),
        },
        blob_root,
        _tmp: tmp,
    }
}

pub async fn seed_user(db: &Database, name: &str) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO users (id, name, created_at) VALUES (?, ?, datetime('now'))")
        .bind(&id)
        .bind(name)
        .execute(db.pool())
        .await
        .expect("seed user");
    id
}

pub async fn count_rows(db: &Database, table: &str) -> i64 {
    let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(db.pool())
        .await
        .expect("count");
    count.0
}

/// Number of regular files anywhere under the blob root.
pub fn blob_file_count(root: &std::path::Path) -> usize {
    fn walk(dir: &std::path::Path, count: &mut usize) {
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    walk(&path, count);
                } else {
                    *count += 1;
                }
            }
        }
    }
    let mut count = 0;
    walk(root, &mut count);
    count
}

/// Local backend wrapper with injectable failures.
pub struct FlakyBackend {
    inner: Arc<LocalBackend>,
    fail_all_puts: AtomicBool,
    fail_deletes: Mutex<HashSet<String>>,
}

impl FlakyBackend {
    pub fn new(inner: Arc<LocalBackend>) -> Self {
        Self {
            inner,
            fail_all_puts: AtomicBool::new(false),
            fail_deletes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_puts(&self) {
        self.fail_all_puts.store(true, Ordering::SeqCst);
    }

    pub fn fail_delete_of(&self, key: &str) {
        self.fail_deletes.lock().unwrap().insert(key.to_string());
    }
}

#[async_trait]
impl BlobBackend for FlakyBackend {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        if self.fail_all_puts.load(Ordering::SeqCst) {
            return Err(StorageError::BackendUnavailable("injected put failure".into()));
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_deletes.lock().unwrap().contains(key) {
            return Err(StorageError::BackendUnavailable(
                "injected delete failure".into(),
            ));
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}

/// Backend whose deletes park on a gate, so a test can hold a cascade
/// mid-flight at a known point.
pub struct GatedBackend {
    inner: Arc<LocalBackend>,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedBackend {
    pub fn new(inner: Arc<LocalBackend>) -> Self {
        Self {
            inner,
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl BlobBackend for GatedBackend {
    async fn put(&self, key: &str, data: Bytes) -> Result<()> {
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    fn backend_name(&self) -> &'static str {
        "gated"
    }
}

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use medthread_store::config::{DocumentConfig, StoreConfig};
use medthread_store::db::document::DocumentStore;
use medthread_store::db::loader::{EngineLoader, NativeLoader, SqlRuntime};
use medthread_store::db::snapshot::{Snapshot, SnapshotInfo, SnapshotStore, SqliteSnapshotStore};
use medthread_store::{Database, StoreError, StoreResult};
use tempfile::TempDir;

/// Config rooted in `tmp` with near-zero retry delays and auto-backup off.
pub fn test_config(tmp: &TempDir) -> StoreConfig {
    let mut config = StoreConfig::in_dir(tmp.path());
    config.sql.retry_delay_ms = 1;
    config.document.retry_delay_ms = 1;
    config.backup.interval_secs = 0;
    config
}

/// A production-wired database in `tmp`, already initialized.
pub async fn ready_db(tmp: &TempDir) -> Database {
    let db = Database::new(test_config(tmp));
    db.initialize().await.unwrap();
    db
}

/// Which loader steps should fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub sql: bool,
    pub document: bool,
}

/// Wraps [`NativeLoader`], counting calls and optionally failing each step.
pub struct TestLoader {
    inner: NativeLoader,
    failures: Failures,
    delay: Duration,
    pub sql_loads: AtomicUsize,
    pub document_opens: AtomicUsize,
}

impl TestLoader {
    pub fn new(tmp: &TempDir, failures: Failures) -> Arc<Self> {
        Arc::new(Self {
            inner: NativeLoader::new(tmp.path()),
            failures,
            delay: Duration::ZERO,
            sql_loads: AtomicUsize::new(0),
            document_opens: AtomicUsize::new(0),
        })
    }

    /// Like [`TestLoader::new`] but each runtime load takes `delay`, widening race windows.
    pub fn slow(tmp: &TempDir, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            inner: NativeLoader::new(tmp.path()),
            failures: Failures::default(),
            delay,
            sql_loads: AtomicUsize::new(0),
            document_opens: AtomicUsize::new(0),
        })
    }

    pub fn sql_loads(&self) -> usize {
        self.sql_loads.load(Ordering::SeqCst)
    }

    pub fn document_opens(&self) -> usize {
        self.document_opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for TestLoader {
    async fn load_sql_runtime(&self) -> StoreResult<SqlRuntime> {
        self.sql_loads.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failures.sql {
            return Err(StoreError::RuntimeLoad("simulated runtime load failure".into()));
        }
        self.inner.load_sql_runtime().await
    }

    async fn open_document_store(&self, config: &DocumentConfig) -> StoreResult<DocumentStore> {
        self.document_opens.fetch_add(1, Ordering::SeqCst);
        if self.failures.document {
            return Err(StoreError::Document("simulated document store failure".into()));
        }
        self.inner.open_document_store(config).await
    }
}

/// Wraps [`SqliteSnapshotStore`], counting saves.
pub struct CountingSnapshotStore {
    inner: SqliteSnapshotStore,
    saves: AtomicUsize,
}

impl CountingSnapshotStore {
    pub fn new(tmp: &TempDir) -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteSnapshotStore::new(tmp.path().join("backup.db"), 0),
            saves: AtomicUsize::new(0),
        })
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl SnapshotStore for CountingSnapshotStore {
    fn load_latest(&self) -> StoreResult<Option<Snapshot>> {
        self.inner.load_latest()
    }

    fn save(&self, data: &[u8]) -> StoreResult<Snapshot> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(data)
    }

    fn history(&self) -> StoreResult<Vec<SnapshotInfo>> {
        self.inner.history()
    }
}

/// A database wired to the given doubles.
pub fn db_with(
    config: StoreConfig,
    loader: Arc<TestLoader>,
    snapshots: Arc<CountingSnapshotStore>,
) -> Database {
    Database::with_parts(config, loader, snapshots)
}

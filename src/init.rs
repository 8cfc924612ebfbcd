//! Database initializer: resolves exactly one live engine.
//!
//! [`Database::initialize`] walks the strategies in strict priority order, each
//! tried only once the previous one is exhausted:
//!
//! 1. **Embedded SQL**: load the runtime, restore from the `"latest"` snapshot
//!    or create a fresh schema; start the auto-backup scheduler; validate integrity.
//! 2. **Schemaless shim**: open the versioned document store behind the query shim.
//! 3. **Mock**: seeded in-memory engine; always succeeds, nothing persists.
//!
//! Every attempt failure is collected and logged as one batch once an engine is
//! resolved. Concurrent `initialize` calls are single-flight: they queue on the
//! same lock and all observe the one handle the first caller published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backup::{self, BackupScheduler};
use crate::config::StoreConfig;
use crate::db::loader::{EngineLoader, NativeLoader};
use crate::db::mock::MockEngine;
use crate::db::schema::{self, IntegrityReport};
use crate::db::shim::ShimEngine;
use crate::db::snapshot::{Snapshot, SnapshotStore, SqliteSnapshotStore};
use crate::db::{Engine, EngineKind};
use crate::error::{StoreError, StoreResult};
use crate::files::urls::BlobUrlRegistry;

/// A resolved engine and, if restored, the time of the snapshot it came from.
type Resolved = (Arc<dyn Engine>, Option<DateTime<Utc>>);

/// One failed attempt of one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyFailure {
    pub strategy: EngineKind,
    pub attempt: u32,
    pub error: String,
}

impl std::fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} attempt {}: {}", self.strategy, self.attempt, self.error)
    }
}

/// The live engine plus its lifecycle state.
pub struct EngineHandle {
    kind: EngineKind,
    engine: Arc<dyn Engine>,
    ready: AtomicBool,
    last_backup_at: Mutex<Option<DateTime<Utc>>>,
    failures: Vec<StrategyFailure>,
}

impl EngineHandle {
    pub fn new(
        engine: Arc<dyn Engine>,
        last_backup_at: Option<DateTime<Utc>>,
        failures: Vec<StrategyFailure>,
    ) -> Self {
        Self {
            kind: engine.kind(),
            engine,
            ready: AtomicBool::new(true),
            last_backup_at: Mutex::new(last_backup_at),
            failures,
        }
    }

    pub fn kind(&self) -> EngineKind {
        self.kind
    }

    pub fn engine(&self) -> Arc<dyn Engine> {
        Arc::clone(&self.engine)
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Time of the last successful backup, or of the snapshot this engine was restored from.
    pub fn last_backup_at(&self) -> Option<DateTime<Utc>> {
        *self
            .last_backup_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_backup(&self, at: DateTime<Utc>) {
        *self
            .last_backup_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(at);
    }

    /// Attempt failures that preceded this engine being chosen.
    pub fn failures(&self) -> &[StrategyFailure] {
        &self.failures
    }

    /// Mark not-ready and release the engine.
    pub(crate) fn close(&self) {
        if self.ready.swap(false, Ordering::AcqRel) {
            self.engine.close();
        }
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("kind", &self.kind)
            .field("ready", &self.is_ready())
            .field("last_backup_at", &self.last_backup_at())
            .field("failures", &self.failures.len())
            .finish()
    }
}

/// Explicit storage context. Owns the live [`EngineHandle`], the snapshot store,
/// the auto-backup scheduler and the transient URL registry. Accessors in
/// [`crate::records`] and [`crate::files`] take it by reference.
pub struct Database {
    shared: Arc<Shared>,
    init_lock: Arc<tokio::sync::Mutex<()>>,
    blob_urls: BlobUrlRegistry,
}

/// State the resolution task needs after its caller has gone away.
struct Shared {
    config: Arc<StoreConfig>,
    loader: Arc<dyn EngineLoader>,
    snapshots: Arc<dyn SnapshotStore>,
    current: RwLock<Option<Arc<EngineHandle>>>,
    scheduler: Mutex<Option<BackupScheduler>>,
}

impl Database {
    /// Production wiring: bundled SQLite, snapshot file and document store under `data_dir`.
    pub fn new(config: StoreConfig) -> Self {
        let data_dir = config.resolved_data_dir();
        let loader = Arc::new(NativeLoader::new(&data_dir));
        let snapshots = Arc::new(SqliteSnapshotStore::new(
            config.snapshot_path(),
            config.backup.max_backups,
        ));
        Self::with_parts(config, loader, snapshots)
    }

    pub fn with_parts(
        config: StoreConfig,
        loader: Arc<dyn EngineLoader>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: Arc::new(config),
                loader,
                snapshots,
                current: RwLock::new(None),
                scheduler: Mutex::new(None),
            }),
            init_lock: Arc::new(tokio::sync::Mutex::new(())),
            blob_urls: BlobUrlRegistry::default(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    pub fn snapshots(&self) -> &Arc<dyn SnapshotStore> {
        &self.shared.snapshots
    }

    pub fn blob_urls(&self) -> &BlobUrlRegistry {
        &self.blob_urls
    }

    /// Resolve the live engine, or return the one already resolved.
    ///
    /// The resolution runs on its own task holding the init lock, so a caller
    /// that is dropped mid-way (e.g. by a timeout) neither aborts nor repeats it.
    pub async fn initialize(&self) -> StoreResult<Arc<EngineHandle>> {
        if let Some(handle) = self.shared.ready_handle() {
            debug!(kind = %handle.kind(), "database already initialized");
            return Ok(handle);
        }

        let guard = Arc::clone(&self.init_lock).lock_owned().await;
        if let Some(handle) = self.shared.ready_handle() {
            debug!(kind = %handle.kind(), "joined in-flight initialization");
            return Ok(handle);
        }

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let _guard = guard;
            shared.resolve_and_publish().await
        })
        .await?
    }

    /// Drop the current engine (stopping its scheduler) and resolve a new one.
    ///
    /// An embedded engine writes a final snapshot first so the new engine
    /// restores everything written so far.
    pub async fn reinitialize(&self) -> StoreResult<Arc<EngineHandle>> {
        let guard = Arc::clone(&self.init_lock).lock_owned().await;
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let _guard = guard;
            shared.stop_scheduler().await;
            if let Some(old) = shared.take_current() {
                info!(kind = %old.kind(), "re-initializing database");
                shared.flush_and_close(&old).await?;
            }
            shared.resolve_and_publish().await
        })
        .await?
    }

    /// The live handle. Fails fast if nothing is initialized or the engine was closed.
    pub fn handle(&self) -> StoreResult<Arc<EngineHandle>> {
        self.shared.ready_handle().ok_or(StoreError::NotInitialized)
    }

    pub fn kind(&self) -> Option<EngineKind> {
        self.shared.ready_handle().map(|h| h.kind())
    }

    pub fn is_ready(&self) -> bool {
        self.shared.ready_handle().is_some()
    }

    pub fn backup_running(&self) -> bool {
        self.shared
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(BackupScheduler::is_running)
    }

    /// Run `op` against the live engine on the blocking pool.
    ///
    /// Readiness is re-checked on every call, never cached by callers.
    pub async fn with_engine<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce(&dyn Engine) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.handle()?.engine();
        tokio::task::spawn_blocking(move || op(engine.as_ref())).await?
    }

    /// One immediate backup cycle. `None` when the engine cannot export.
    pub async fn backup_now(&self) -> StoreResult<Option<Snapshot>> {
        let handle = self.handle()?;
        if !handle.kind().supports_export() {
            info!(kind = %handle.kind(), "backup skipped: engine does not support export");
            return Ok(None);
        }
        backup::run_backup_cycle(&handle, &self.shared.snapshots)
            .await
            .map(Some)
    }

    /// Integrity report for the live engine (embedded SQL only).
    pub async fn integrity_report(&self) -> StoreResult<Option<IntegrityReport>> {
        if self.kind() != Some(EngineKind::EmbeddedSql) {
            return Ok(None);
        }
        self.with_engine(|engine| schema::validate_integrity(engine).map(Some))
            .await
    }

    /// Stop the scheduler, write a final snapshot for the embedded engine, close it.
    pub async fn shutdown(&self) -> StoreResult<()> {
        let _guard = self.init_lock.lock().await;
        self.shared.stop_scheduler().await;

        let Some(handle) = self.shared.take_current() else {
            return Ok(());
        };
        let result = self.shared.flush_and_close(&handle).await;
        info!(kind = %handle.kind(), "database shut down");
        result
    }
}

impl Shared {
    fn ready_handle(&self) -> Option<Arc<EngineHandle>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|h| h.is_ready())
            .cloned()
    }

    fn take_current(&self) -> Option<Arc<EngineHandle>> {
        self.current
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn stop_scheduler(&self) {
        let scheduler = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(scheduler) = scheduler {
            scheduler.stop().await;
        }
    }

    /// Final snapshot for an exportable engine, then close. The handle is
    /// closed even when the snapshot fails.
    async fn flush_and_close(&self, handle: &Arc<EngineHandle>) -> StoreResult<()> {
        let result = if handle.kind().supports_export() && handle.is_ready() {
            backup::run_backup_cycle(handle, &self.snapshots)
                .await
                .map(|snapshot| {
                    info!(bytes = snapshot.data.len(), "final backup written");
                })
        } else {
            Ok(())
        };
        handle.close();
        result
    }

    async fn resolve_and_publish(&self) -> StoreResult<Arc<EngineHandle>> {
        let mut failures = Vec::new();

        let mut resolved = self.try_embedded_sql(&mut failures).await;
        if resolved.is_none() {
            resolved = self.try_schemaless(&mut failures).await;
        }
        if resolved.is_none() {
            warn!("using mock database as final fallback; data will not persist");
            resolved = Some((Arc::new(MockEngine::seeded()) as Arc<dyn Engine>, None));
        }
        let Some((engine, restored_at)) = resolved else {
            let summary = failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            error!(%summary, "critical database initialization failure");
            return Err(StoreError::InitializationFailed(summary));
        };

        if !failures.is_empty() {
            warn!(
                count = failures.len(),
                errors = ?failures.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "initialization errors encountered"
            );
        }

        let handle = Arc::new(EngineHandle::new(engine, restored_at, failures));

        if handle.kind() == EngineKind::EmbeddedSql {
            self.start_scheduler(&handle);
            let engine = handle.engine();
            if let Err(e) =
                tokio::task::spawn_blocking(move || schema::log_integrity(engine.as_ref())).await
            {
                warn!(error = %e, "integrity validation task failed");
            }
        }

        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&handle));

        info!(kind = %handle.kind(), "database initialized");
        Ok(handle)
    }

    fn start_scheduler(&self, handle: &Arc<EngineHandle>) {
        let interval = self.config.backup.interval();
        if interval.is_zero() {
            info!("auto-backup disabled (interval is 0)");
            return;
        }
        let scheduler =
            BackupScheduler::start(Arc::clone(handle), Arc::clone(&self.snapshots), interval);
        let previous = self
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(scheduler);
        // Callers stop the old scheduler first; dropping aborts any leftover.
        drop(previous);
    }

    async fn try_embedded_sql(
        &self,
        failures: &mut Vec<StrategyFailure>,
    ) -> Option<Resolved> {
        let attempts = self.config.sql.max_retries;
        for attempt in 1..=attempts {
            info!(attempt, attempts, "attempting embedded SQL initialization");
            match self.open_embedded_sql().await {
                Ok(opened) => return Some(opened),
                Err(e) => {
                    error!(attempt, error = %e, "embedded SQL attempt failed");
                    failures.push(StrategyFailure {
                        strategy: EngineKind::EmbeddedSql,
                        attempt,
                        error: e.to_string(),
                    });
                    if attempt < attempts {
                        tokio::time::sleep(self.config.sql.retry_delay()).await;
                    }
                }
            }
        }
        None
    }

    async fn open_embedded_sql(&self) -> StoreResult<Resolved> {
        let runtime = self.loader.load_sql_runtime().await?;
        let snapshots = Arc::clone(&self.snapshots);

        tokio::task::spawn_blocking(move || -> StoreResult<Resolved> {
            let restored = match snapshots.load_latest() {
                Ok(Some(snapshot)) if !snapshot.data.is_empty() => {
                    match runtime.restore(&snapshot.data) {
                        Ok(engine) => {
                            info!(
                                bytes = snapshot.data.len(),
                                taken_at = %snapshot.timestamp,
                                "restored database from snapshot"
                            );
                            Some((engine, snapshot.timestamp))
                        }
                        Err(e) => {
                            warn!(error = %e, "snapshot restore failed");
                            None
                        }
                    }
                }
                Ok(_) => {
                    debug!("no snapshot available");
                    None
                }
                Err(e) => {
                    warn!(error = %e, "snapshot store unreadable");
                    None
                }
            };

            match restored {
                Some((engine, taken_at)) => {
                    Ok((Arc::new(engine) as Arc<dyn Engine>, Some(taken_at)))
                }
                None => {
                    let engine = runtime.create_empty()?;
                    schema::init_schema(&engine)?;
                    info!(sqlite = runtime.version(), "created new database with schema");
                    Ok((Arc::new(engine) as Arc<dyn Engine>, None))
                }
            }
        })
        .await?
    }

    async fn try_schemaless(
        &self,
        failures: &mut Vec<StrategyFailure>,
    ) -> Option<Resolved> {
        let attempts = self.config.document.max_retries;
        for attempt in 1..=attempts {
            info!(attempt, attempts, "attempting document store initialization");
            match self.loader.open_document_store(&self.config.document).await {
                Ok(store) => {
                    return Some((Arc::new(ShimEngine::new(store)) as Arc<dyn Engine>, None));
                }
                Err(e) => {
                    error!(attempt, error = %e, "document store attempt failed");
                    failures.push(StrategyFailure {
                        strategy: EngineKind::SchemalessShim,
                        attempt,
                        error: e.to_string(),
                    });
                    if attempt < attempts {
                        tokio::time::sleep(self.config.document.retry_delay()).await;
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(tmp: &TempDir) -> StoreConfig {
        let mut config = StoreConfig::in_dir(tmp.path());
        config.sql.retry_delay_ms = 1;
        config.document.retry_delay_ms = 1;
        config
    }

    #[tokio::test]
    async fn accessors_fail_fast_before_initialize() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(test_config(&tmp));
        assert!(matches!(db.handle(), Err(StoreError::NotInitialized)));
        assert!(db.kind().is_none());
        let result = db.with_engine(|_| Ok(())).await;
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[tokio::test]
    async fn fresh_initialize_uses_embedded_sql() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(test_config(&tmp));

        let handle = db.initialize().await.unwrap();
        assert_eq!(handle.kind(), EngineKind::EmbeddedSql);
        assert!(handle.is_ready());
        assert!(handle.failures().is_empty());
        assert!(handle.last_backup_at().is_none());
        assert!(db.backup_running());

        let report = db.integrity_report().await.unwrap().unwrap();
        assert!(report.is_healthy());
        db.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn zero_attempts_skip_a_strategy() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(&tmp);
        config.sql.max_retries = 0;
        let db = Database::new(config);

        let handle = db.initialize().await.unwrap();
        assert_eq!(handle.kind(), EngineKind::SchemalessShim);
        assert!(!db.backup_running());
        assert!(db.backup_now().await.unwrap().is_none());
        assert!(db.integrity_report().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shutdown_closes_handle() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(test_config(&tmp));
        let handle = db.initialize().await.unwrap();

        db.shutdown().await.unwrap();
        assert!(!handle.is_ready());
        assert!(!db.is_ready());
        assert!(!db.backup_running());
        assert!(db.snapshots().load_latest().unwrap().is_some());
    }

    #[tokio::test]
    async fn reinitialize_replaces_handle() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(test_config(&tmp));
        let first = db.initialize().await.unwrap();

        let second = db.reinitialize().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!first.is_ready());
        assert!(second.is_ready());
        assert!(db.backup_running());
        db.shutdown().await.unwrap();
    }
}

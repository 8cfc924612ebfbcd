//! Periodic snapshotting of the embedded engine.
//!
//! [`BackupScheduler`] owns a tokio task that, every interval, exports the
//! engine image on the blocking pool and overwrites the `"latest"` snapshot.
//! A failed cycle is logged and the next tick tries again independently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::db::snapshot::{Snapshot, SnapshotStore};
use crate::error::{StoreError, StoreResult};
use crate::init::EngineHandle;

/// Export the engine held by `handle` and persist it as the latest snapshot.
pub async fn run_backup_cycle(
    handle: &Arc<EngineHandle>,
    snapshots: &Arc<dyn SnapshotStore>,
) -> StoreResult<Snapshot> {
    if !handle.kind().supports_export() {
        return Err(StoreError::Snapshot(format!(
            "{} engine does not support export",
            handle.kind()
        )));
    }
    if !handle.is_ready() {
        return Err(StoreError::NotInitialized);
    }

    let engine = handle.engine();
    let snapshots = Arc::clone(snapshots);
    let snapshot = tokio::task::spawn_blocking(move || {
        let data = engine.export()?;
        snapshots.save(&data)
    })
    .await??;

    handle.record_backup(snapshot.timestamp);
    Ok(snapshot)
}

pub struct BackupScheduler {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BackupScheduler {
    /// Start ticking. The first backup happens one full `period` from now.
    pub fn start(
        handle: Arc<EngineHandle>,
        snapshots: Arc<dyn SnapshotStore>,
        period: Duration,
    ) -> Self {
        let period = period.max(Duration::from_millis(1));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        match run_backup_cycle(&handle, &snapshots).await {
                            Ok(snapshot) => tracing::info!(
                                bytes = snapshot.data.len(),
                                "auto-backup completed"
                            ),
                            Err(e) => tracing::error!(error = %e, "auto-backup failed"),
                        }
                    }
                }
            }
        });

        tracing::info!(interval_secs = period.as_secs_f64(), "auto-backup started");
        Self {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop the timer and wait for any in-flight cycle to finish.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "auto-backup task ended abnormally");
            }
        }
        tracing::info!("auto-backup stopped");
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockEngine;
    use crate::db::schema;
    use crate::db::snapshot::SqliteSnapshotStore;
    use crate::db::sql::SqlEngine;
    use crate::db::Engine;
    use tempfile::TempDir;

    fn sql_handle() -> Arc<EngineHandle> {
        let engine = SqlEngine::open_in_memory().unwrap();
        schema::init_schema(&engine).unwrap();
        Arc::new(EngineHandle::new(Arc::new(engine), None, Vec::new()))
    }

    #[tokio::test]
    async fn cycle_writes_latest_and_stamps_handle() {
        let tmp = TempDir::new().unwrap();
        let snapshots: Arc<dyn SnapshotStore> =
            Arc::new(SqliteSnapshotStore::new(tmp.path().join("backup.db"), 0));
        let handle = sql_handle();
        assert!(handle.last_backup_at().is_none());

        let snapshot = run_backup_cycle(&handle, &snapshots).await.unwrap();
        assert!(!snapshot.data.is_empty());
        assert_eq!(handle.last_backup_at(), Some(snapshot.timestamp));

        let latest = snapshots.load_latest().unwrap().unwrap();
        assert_eq!(latest.data, snapshot.data);
    }

    #[tokio::test]
    async fn cycle_refuses_engines_without_export() {
        let tmp = TempDir::new().unwrap();
        let snapshots: Arc<dyn SnapshotStore> =
            Arc::new(SqliteSnapshotStore::new(tmp.path().join("backup.db"), 0));
        let engine: Arc<dyn Engine> = Arc::new(MockEngine::seeded());
        let handle = Arc::new(EngineHandle::new(engine, None, Vec::new()));

        assert!(run_backup_cycle(&handle, &snapshots).await.is_err());
        assert!(snapshots.load_latest().unwrap().is_none());
    }

    #[tokio::test]
    async fn stop_ends_the_task() {
        let tmp = TempDir::new().unwrap();
        let snapshots: Arc<dyn SnapshotStore> =
            Arc::new(SqliteSnapshotStore::new(tmp.path().join("backup.db"), 0));
        let scheduler =
            BackupScheduler::start(sql_handle(), snapshots, Duration::from_secs(3600));
        assert!(scheduler.is_running());
        scheduler.stop().await;
    }
}

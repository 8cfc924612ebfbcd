mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::CountingSnapshotStore;
use medthread_store::backup::BackupScheduler;
use medthread_store::db::schema;
use medthread_store::db::snapshot::{SnapshotStore, SqliteSnapshotStore};
use medthread_store::db::sql::SqlEngine;
use medthread_store::EngineHandle;
use tempfile::TempDir;

fn sql_handle() -> Arc<EngineHandle> {
    let engine = SqlEngine::open_in_memory().unwrap();
    schema::init_schema(&engine).unwrap();
    Arc::new(EngineHandle::new(Arc::new(engine), None, Vec::new()))
}

async fn wait_for_saves(store: &CountingSnapshotStore, at_least: usize) {
    for _ in 0..200 {
        if store.saves() >= at_least {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("scheduler never reached {at_least} saves");
}

#[tokio::test]
async fn scheduler_writes_on_each_tick() {
    let tmp = TempDir::new().unwrap();
    let store = CountingSnapshotStore::new(&tmp);
    let handle = sql_handle();

    let scheduler = BackupScheduler::start(
        Arc::clone(&handle),
        store.clone(),
        Duration::from_millis(25),
    );
    wait_for_saves(&store, 2).await;
    scheduler.stop().await;

    assert!(handle.last_backup_at().is_some());
    assert!(store.load_latest().unwrap().is_some());
}

#[tokio::test]
async fn no_writes_after_stop() {
    let tmp = TempDir::new().unwrap();
    let store = CountingSnapshotStore::new(&tmp);
    let period = Duration::from_millis(25);

    let scheduler = BackupScheduler::start(sql_handle(), store.clone(), period);
    wait_for_saves(&store, 1).await;
    scheduler.stop().await;

    let after_stop = store.saves();
    tokio::time::sleep(period * 3).await;
    assert_eq!(store.saves(), after_stop);
}

#[tokio::test]
async fn first_tick_waits_a_full_period() {
    let tmp = TempDir::new().unwrap();
    let store = CountingSnapshotStore::new(&tmp);

    let scheduler =
        BackupScheduler::start(sql_handle(), store.clone(), Duration::from_secs(3600));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(store.saves(), 0);
    scheduler.stop().await;
}

#[tokio::test]
async fn history_is_bounded_by_max_backups() {
    let tmp = TempDir::new().unwrap();
    let store: Arc<dyn SnapshotStore> =
        Arc::new(SqliteSnapshotStore::new(tmp.path().join("backup.db"), 2));
    let handle = sql_handle();

    for _ in 0..4 {
        medthread_store::backup::run_backup_cycle(&handle, &store)
            .await
            .unwrap();
    }

    let history = store.history().unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0].id > history[1].id);
}

#[tokio::test]
async fn database_scheduler_stops_on_reinitialize() {
    let tmp = TempDir::new().unwrap();
    let mut config = helpers::test_config(&tmp);
    config.backup.interval_secs = 3600;
    let db = medthread_store::Database::new(config);

    db.initialize().await.unwrap();
    assert!(db.backup_running());

    db.reinitialize().await.unwrap();
    assert!(db.backup_running());

    db.shutdown().await.unwrap();
    assert!(!db.backup_running());
}

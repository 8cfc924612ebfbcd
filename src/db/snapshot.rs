//! Durable key-value store for exported database images.
//!
//! The embedded engine is restored from the record keyed `"latest"`, which every
//! backup overwrites in place. A bounded `backup_history` table keeps up to
//! `max_backups` older images for manual recovery; restore never reads it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::error::{StoreError, StoreResult};

/// Key of the snapshot that restore reads.
pub const LATEST_KEY: &str = "latest";

const SNAPSHOT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS backups (
    id TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS backup_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    size INTEGER NOT NULL,
    data BLOB NOT NULL,
    timestamp TEXT NOT NULL
);
"#;

/// A stored database image.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub id: String,
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Metadata for an archived snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub id: i64,
    pub size: u64,
    pub timestamp: String,
}

/// Where snapshots live. Implementations must tolerate being called from
/// blocking threads.
pub trait SnapshotStore: Send + Sync {
    /// The `"latest"` snapshot, or `None` if nothing was ever saved.
    fn load_latest(&self) -> StoreResult<Option<Snapshot>>;

    /// Overwrite `"latest"` with `data`.
    fn save(&self, data: &[u8]) -> StoreResult<Snapshot>;

    /// Archived snapshots, newest first.
    fn history(&self) -> StoreResult<Vec<SnapshotInfo>> {
        Ok(Vec::new())
    }
}

/// [`SnapshotStore`] backed by its own SQLite file, opened per operation.
pub struct SqliteSnapshotStore {
    path: PathBuf,
    max_backups: usize,
}

impl SqliteSnapshotStore {
    pub fn new(path: impl Into<PathBuf>, max_backups: usize) -> Self {
        Self {
            path: path.into(),
            max_backups,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> StoreResult<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(SNAPSHOT_SQL)?;
        Ok(conn)
    }
}

fn parse_timestamp(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Snapshot(format!("bad snapshot timestamp {raw:?}: {e}")))
}

impl SnapshotStore for SqliteSnapshotStore {
    fn load_latest(&self) -> StoreResult<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let conn = self.open()?;
        let row: Option<(String, Vec<u8>, String)> = conn
            .query_row(
                "SELECT id, data, timestamp FROM backups WHERE id = ?1",
                params![LATEST_KEY],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(id, data, timestamp)| {
            Ok(Snapshot {
                id,
                data,
                timestamp: parse_timestamp(&timestamp)?,
            })
        })
        .transpose()
    }

    fn save(&self, data: &[u8]) -> StoreResult<Snapshot> {
        let mut conn = self.open()?;
        let now = Utc::now();
        let timestamp = now.to_rfc3339();

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO backups (id, data, timestamp) VALUES (?1, ?2, ?3)",
            params![LATEST_KEY, data, timestamp],
        )?;
        if self.max_backups > 0 {
            tx.execute(
                "INSERT INTO backup_history (size, data, timestamp) VALUES (?1, ?2, ?3)",
                params![data.len() as i64, data, timestamp],
            )?;
            let pruned = tx.execute(
                "DELETE FROM backup_history WHERE id NOT IN \
                 (SELECT id FROM backup_history ORDER BY id DESC LIMIT ?1)",
                params![self.max_backups as i64],
            )?;
            if pruned > 0 {
                tracing::debug!(pruned, keep = self.max_backups, "rotated backup history");
            }
        }
        tx.commit()?;

        Ok(Snapshot {
            id: LATEST_KEY.to_string(),
            data: data.to_vec(),
            timestamp: now,
        })
    }

    fn history(&self) -> StoreResult<Vec<SnapshotInfo>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT id, size, timestamp FROM backup_history ORDER BY id DESC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SnapshotInfo {
                    id: row.get(0)?,
                    size: row.get::<_, i64>(1)? as u64,
                    timestamp: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_means_no_snapshot() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteSnapshotStore::new(tmp.path().join("backup.db"), 3);
        assert!(store.load_latest().unwrap().is_none());
        assert!(store.history().unwrap().is_empty());
        // Reading must not create the file.
        assert!(!store.path().exists());
    }

    #[test]
    fn save_overwrites_latest() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteSnapshotStore::new(tmp.path().join("backup.db"), 0);

        store.save(b"first").unwrap();
        store.save(b"second").unwrap();

        let latest = store.load_latest().unwrap().unwrap();
        assert_eq!(latest.id, LATEST_KEY);
        assert_eq!(latest.data, b"second");
        // History disabled.
        assert!(store.history().unwrap().is_empty());
    }

    #[test]
    fn history_is_pruned_to_max_backups() {
        let tmp = TempDir::new().unwrap();
        let store = SqliteSnapshotStore::new(tmp.path().join("backup.db"), 2);

        for payload in [&b"a"[..], b"bb", b"ccc"] {
            store.save(payload).unwrap();
        }

        let history = store.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].size, 3);
        assert_eq!(history[1].size, 2);
        assert_eq!(store.load_latest().unwrap().unwrap().data, b"ccc");
    }
}

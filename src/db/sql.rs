//! Embedded SQLite engine.
//!
//! The database lives entirely in memory; durability comes from exporting its
//! full binary image ([`SqlEngine::export`]) into the snapshot store and
//! rebuilding from that image on the next start ([`SqlEngine::from_snapshot`]).
//! Both directions serialize the main database in memory; nothing touches disk.
//!
//! Foreign keys are declared in the schema but never enforced: records may
//! reference a patient that has not been saved yet.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::backup::Backup;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, MAIN_DB};

use super::{preview, Engine, EngineKind, Row, RunResult};
use crate::error::{StoreError, StoreResult};

/// Pages copied per backup step.
const BACKUP_PAGES_PER_STEP: std::os::raw::c_int = 256;

pub struct SqlEngine {
    conn: Mutex<Connection>,
}

impl SqlEngine {
    /// Open an empty in-memory database. No schema is applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    /// Wrap an open connection. Foreign key enforcement is switched off here
    /// since the pragma is per connection and not part of an exported image.
    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Rebuild an in-memory database from an exported image.
    pub fn from_snapshot(bytes: &[u8]) -> StoreResult<Self> {
        if bytes.is_empty() {
            return Err(StoreError::Snapshot("snapshot payload is empty".into()));
        }

        let mut conn = Connection::open_in_memory()?;
        conn.deserialize_read_exact(MAIN_DB, bytes, bytes.len(), false)?;

        // A garbage image fails here rather than on first use.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })?;

        Self::from_connection(conn)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Task(format!("db lock poisoned: {e}")))
    }

    /// Copy the live database into an on-disk file at `path` using the online
    /// backup API.
    pub fn export_to(&self, path: &Path) -> StoreResult<()> {
        let conn = self.lock()?;
        let mut dst = Connection::open(path)?;
        let backup = Backup::new(&conn, &mut dst)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, Duration::ZERO, None)?;
        Ok(())
    }
}

fn collect_rows(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Vec<Row>> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();

    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(r) = rows.next()? {
        let mut row = Row::new();
        for (i, name) in names.iter().enumerate() {
            row.push(name.clone(), r.get::<_, Value>(i)?);
        }
        out.push(row);
    }
    Ok(out)
}

impl Engine for SqlEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::EmbeddedSql
    }

    fn exec(&self, sql: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn run(&self, sql: &str, params: &[Value]) -> StoreResult<RunResult> {
        let conn = self.lock()?;
        let changes = conn.execute(sql, params_from_iter(params.iter()))?;
        Ok(RunResult {
            changes,
            last_insert_id: conn.last_insert_rowid(),
        })
    }

    fn get(&self, sql: &str, params: &[Value]) -> StoreResult<Option<Row>> {
        let conn = self.lock()?;
        Ok(collect_rows(&conn, sql, params)?.into_iter().next())
    }

    fn all(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        let conn = self.lock()?;
        collect_rows(&conn, sql, params).map_err(|e| {
            tracing::debug!(sql = %preview(sql), error = %e, "query failed");
            StoreError::from(e)
        })
    }

    fn export(&self) -> StoreResult<Vec<u8>> {
        let conn = self.lock()?;
        let image = conn.serialize(MAIN_DB)?;
        Ok(image.to_vec())
    }
}

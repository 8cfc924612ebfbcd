//! SQL DDL for the clinical record tables.
//!
//! Defines `Patient`, `Observation`, `Condition`, `DocumentReference`,
//! `ChatMessage`, and `Task`. All DDL uses `IF NOT EXISTS` so it can be replayed
//! against any fresh or restored engine.

use serde::Serialize;

use super::Engine;
use crate::error::StoreResult;

/// Schema DDL, executed verbatim against a fresh embedded engine.
pub const FHIR_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS Patient (
  id TEXT PRIMARY KEY,
  name TEXT,
  birthDate TEXT,
  gender TEXT,
  telecom TEXT
);

CREATE TABLE IF NOT EXISTS Observation (
  id TEXT PRIMARY KEY,
  patientId TEXT,
  code TEXT,
  display TEXT,
  value TEXT,
  unit TEXT,
  issued TEXT,
  FOREIGN KEY (patientId) REFERENCES Patient(id)
);

CREATE TABLE IF NOT EXISTS Condition (
  id TEXT PRIMARY KEY,
  patientId TEXT,
  code TEXT,
  display TEXT,
  onsetDateTime TEXT,
  recordedDate TEXT,
  FOREIGN KEY (patientId) REFERENCES Patient(id)
);

CREATE TABLE IF NOT EXISTS DocumentReference (
  id TEXT PRIMARY KEY,
  patientId TEXT,
  filename TEXT,
  mimeType TEXT,
  data BLOB,
  uploadedAt TEXT,
  FOREIGN KEY (patientId) REFERENCES Patient(id)
);

CREATE TABLE IF NOT EXISTS ChatMessage (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  patientId TEXT,
  role TEXT,
  content TEXT,
  timestamp TEXT,
  metadata TEXT
);

CREATE TABLE IF NOT EXISTS Task (
  id TEXT PRIMARY KEY,
  patientId TEXT,
  description TEXT,
  status TEXT,
  assignedTo TEXT,
  createdAt TEXT,
  completedAt TEXT
);
"#;

/// Tables the integrity check expects to find.
pub const REQUIRED_TABLES: [&str; 6] = [
    "Patient",
    "Observation",
    "Condition",
    "DocumentReference",
    "ChatMessage",
    "Task",
];

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(engine: &dyn Engine) -> StoreResult<()> {
    engine.exec(FHIR_SCHEMA)
}

/// Result of [`validate_integrity`].
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub tables: Vec<String>,
    pub missing_tables: Vec<String>,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.integrity_ok && self.missing_tables.is_empty()
    }
}

/// Check that all required tables exist and SQLite's own integrity check passes.
pub fn validate_integrity(engine: &dyn Engine) -> StoreResult<IntegrityReport> {
    let tables: Vec<String> = engine
        .all(
            "SELECT name FROM sqlite_master WHERE type='table' ORDER BY name",
            &[],
        )?
        .iter()
        .filter_map(|row| row.text("name"))
        .collect();

    let missing_tables = REQUIRED_TABLES
        .iter()
        .filter(|required| !tables.iter().any(|t| t == *required))
        .map(|t| t.to_string())
        .collect();

    let integrity_details = engine
        .get("PRAGMA integrity_check", &[])?
        .and_then(|row| row.text("integrity_check"))
        .unwrap_or_else(|| "no result".to_string());

    Ok(IntegrityReport {
        tables,
        missing_tables,
        integrity_ok: integrity_details == "ok",
        integrity_details,
    })
}

/// Run [`validate_integrity`] and log the outcome. Never fails.
pub fn log_integrity(engine: &dyn Engine) -> Option<IntegrityReport> {
    match validate_integrity(engine) {
        Ok(report) => {
            if !report.missing_tables.is_empty() {
                tracing::warn!(missing = ?report.missing_tables, "missing database tables");
            } else if !report.integrity_ok {
                tracing::warn!(details = %report.integrity_details, "database integrity check failed");
            } else {
                tracing::info!(tables = report.tables.len(), "database integrity validated");
            }
            Some(report)
        }
        Err(e) => {
            tracing::warn!(error = %e, "database integrity check could not run");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sql::SqlEngine;

    #[test]
    fn schema_creates_all_tables() {
        let engine = SqlEngine::open_in_memory().unwrap();
        init_schema(&engine).unwrap();

        let report = validate_integrity(&engine).unwrap();
        for table in REQUIRED_TABLES {
            assert!(report.tables.contains(&table.to_string()), "{table} missing");
        }
        assert!(report.missing_tables.is_empty());
        assert!(report.integrity_ok);
        assert!(report.is_healthy());
    }

    #[test]
    fn schema_is_idempotent() {
        let engine = SqlEngine::open_in_memory().unwrap();
        init_schema(&engine).unwrap();
        init_schema(&engine).unwrap(); // second call should not error
    }

    #[test]
    fn missing_tables_are_reported_not_fatal() {
        let engine = SqlEngine::open_in_memory().unwrap();
        engine
            .exec("CREATE TABLE Patient (id TEXT PRIMARY KEY, name TEXT);")
            .unwrap();

        let report = log_integrity(&engine).unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.missing_tables.len(), 5);
        assert!(!report.missing_tables.contains(&"Patient".to_string()));
        assert!(!report.is_healthy());
    }
}

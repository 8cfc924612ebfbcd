//! Storage engines behind a single statement-level interface.
//!
//! [`Engine`] is the capability set every backend exposes: execute a statement
//! batch, run a mutation, fetch one row, fetch all rows, and export the full
//! state. Three variants exist and exactly one is selected at initialization:
//!
//! - [`sql::SqlEngine`]: in-memory SQLite with snapshot export/import
//! - [`shim::ShimEngine`]: a [`document::DocumentStore`] behind a SQL-shaped shim
//! - [`mock::MockEngine`]: seeded, non-durable, last-resort fallback

pub mod document;
pub mod loader;
pub mod mock;
pub mod row;
pub mod schema;
pub mod shim;
pub mod snapshot;
pub mod sql;

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

pub use row::{Row, RunResult};

/// Which strategy produced the live engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// In-process SQLite, durable through snapshots.
    EmbeddedSql,
    /// Versioned document store wrapped in the query shim.
    SchemalessShim,
    /// In-memory demo data; nothing persists.
    Mock,
}

impl EngineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmbeddedSql => "embedded_sql",
            Self::SchemalessShim => "schemaless_shim",
            Self::Mock => "mock",
        }
    }

    /// Whether the engine state can be exported as a snapshot.
    pub fn supports_export(&self) -> bool {
        matches!(self, Self::EmbeddedSql)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EngineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "embedded_sql" => Ok(Self::EmbeddedSql),
            "schemaless_shim" => Ok(Self::SchemalessShim),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("unknown engine kind: {s}")),
        }
    }
}

/// Statement-level storage interface shared by all engine variants.
///
/// Methods are synchronous; async callers go through
/// [`crate::init::Database::with_engine`], which runs them on the blocking pool.
pub trait Engine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Execute one or more statements with no parameters and no results.
    fn exec(&self, sql: &str) -> StoreResult<()>;

    /// Run a single mutation.
    fn run(&self, sql: &str, params: &[Value]) -> StoreResult<RunResult>;

    /// Fetch the first row, if any.
    fn get(&self, sql: &str, params: &[Value]) -> StoreResult<Option<Row>>;

    /// Fetch every row.
    fn all(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>>;

    /// Full binary state. Engines without export support return an empty payload.
    fn export(&self) -> StoreResult<Vec<u8>>;

    /// Release engine resources. Further calls may fail.
    fn close(&self) {}
}

/// Shorten a statement for log output.
pub(crate) fn preview(sql: &str) -> String {
    let compact = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= 60 {
        compact
    } else {
        let cut: String = compact.chars().take(60).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_kind_round_trips_through_str() {
        for kind in [EngineKind::EmbeddedSql, EngineKind::SchemalessShim, EngineKind::Mock] {
            assert_eq!(kind.as_str().parse::<EngineKind>().unwrap(), kind);
        }
        assert!("sqljs".parse::<EngineKind>().is_err());
    }

    #[test]
    fn only_embedded_sql_exports() {
        assert!(EngineKind::EmbeddedSql.supports_export());
        assert!(!EngineKind::SchemalessShim.supports_export());
        assert!(!EngineKind::Mock.supports_export());
    }

    #[test]
    fn preview_truncates_long_statements() {
        let sql = format!("SELECT {} FROM Patient", "a, ".repeat(40));
        let short = preview(&sql);
        assert!(short.ends_with("..."));
        assert_eq!(preview("SELECT *\n   FROM Task"), "SELECT * FROM Task");
    }
}

//! Engine acquisition.
//!
//! [`EngineLoader`] is the seam between the initializer and the engines it tries:
//! loading the SQL runtime and opening the fallback document store are both
//! fallible, asynchronous steps that the initializer retries. [`NativeLoader`]
//! is the production implementation.

use std::path::PathBuf;

use async_trait::async_trait;

use super::document::DocumentStore;
use super::shim::COLLECTIONS;
use super::sql::SqlEngine;
use crate::config::DocumentConfig;
use crate::error::{StoreError, StoreResult};

/// A loaded embedded-SQL runtime, able to produce engines.
#[derive(Debug, Clone)]
pub struct SqlRuntime {
    version: String,
}

impl SqlRuntime {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    /// SQLite library version backing this runtime.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// An empty engine with no schema.
    pub fn create_empty(&self) -> StoreResult<SqlEngine> {
        SqlEngine::open_in_memory()
    }

    /// An engine rebuilt from an exported image.
    pub fn restore(&self, bytes: &[u8]) -> StoreResult<SqlEngine> {
        SqlEngine::from_snapshot(bytes)
    }
}

#[async_trait]
pub trait EngineLoader: Send + Sync {
    /// Acquire the embedded-SQL runtime. Failures count as a failed attempt.
    async fn load_sql_runtime(&self) -> StoreResult<SqlRuntime>;

    /// Open the versioned document store for the schemaless fallback.
    async fn open_document_store(&self, config: &DocumentConfig) -> StoreResult<DocumentStore>;
}

/// Loads bundled SQLite and keeps the document store under `data_dir`.
pub struct NativeLoader {
    data_dir: PathBuf,
}

impl NativeLoader {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

#[async_trait]
impl EngineLoader for NativeLoader {
    async fn load_sql_runtime(&self) -> StoreResult<SqlRuntime> {
        let version = tokio::task::spawn_blocking(|| -> StoreResult<String> {
            let probe = rusqlite::Connection::open_in_memory()?;
            let version: String =
                probe.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;
            Ok(version)
        })
        .await?
        .map_err(|e| StoreError::RuntimeLoad(e.to_string()))?;

        tracing::debug!(sqlite = %version, "embedded SQL runtime loaded");
        Ok(SqlRuntime::new(version))
    }

    async fn open_document_store(&self, config: &DocumentConfig) -> StoreResult<DocumentStore> {
        let path = self.data_dir.join(format!("{}.json", config.db_name));
        let name = config.db_name.clone();
        let version = config.version;
        tokio::task::spawn_blocking(move || DocumentStore::open(path, &name, version, &COLLECTIONS))
            .await?
    }
}

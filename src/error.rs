//! Error taxonomy for the storage core.
//!
//! Engine-acquisition failures never reach callers of [`crate::init::Database::initialize`]
//! (they are retried and then escalate to the next strategy). Everything else surfaces
//! as a [`StoreError`] that callers treat as non-fatal.

/// Result alias used across the storage core.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database not initialized; call Database::initialize() first")]
    NotInitialized,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("document store error: {0}")]
    Document(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("engine runtime failed to load: {0}")]
    RuntimeLoad(String),

    #[error("file data not available: {0}")]
    FileUnavailable(String),

    #[error("background task failed: {0}")]
    Task(String),

    #[error("all storage strategies failed: {0}")]
    InitializationFailed(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

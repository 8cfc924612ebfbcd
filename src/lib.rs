//! Durable local storage for clinical records, with graceful degradation.
//!
//! MedThread keeps patients, observations, conditions, chat threads, tasks and
//! file attachments in an in-process SQLite database. A [`Database`] resolves
//! exactly one engine at startup, trying each strategy in turn:
//!
//! | Engine | Backing | Durable | Export |
//! |--------|---------|---------|--------|
//! | **Embedded SQL** | in-memory SQLite, restored from the latest snapshot | via auto-backup | yes |
//! | **Schemaless shim** | versioned JSON document store behind a tiny SQL shim | yes | no |
//! | **Mock** | seeded in-memory data | no | no |
//!
//! # Architecture
//!
//! - **Engines**: one [`db::Engine`] trait (`exec`, `run`, `get`, `all`, `export`)
//!   with three implementations, selected once and held behind an [`EngineHandle`]
//! - **Snapshots**: the embedded engine is exported on a timer and written to a
//!   separate SQLite file under the key `"latest"`
//! - **Accessors**: typed async functions over the live engine; every call
//!   re-checks readiness
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: Engine trait, the three engines, schema, snapshot store and loader
//! - [`init`]: The [`Database`] context and its single-flight initializer
//! - [`backup`]: Periodic snapshotting of the embedded engine
//! - [`records`]: Patient, observation, condition, chat and task accessors
//! - [`files`]: File attachment storage, validation and transient URLs

pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod init;
pub mod records;

pub use db::EngineKind;
pub use error::{StoreError, StoreResult};
pub use init::{Database, EngineHandle, StrategyFailure};

use chrono::{SecondsFormat, Utc};

/// Current UTC time as RFC 3339 with fixed microsecond precision, so stored
/// timestamps sort lexicographically.
pub fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

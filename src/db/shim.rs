//! SQL-shaped shim over the [`DocumentStore`].
//!
//! Recognizes a fixed, deliberately small grammar by case-insensitive prefix
//! matching on the trimmed statement text:
//!
//! - `INSERT INTO <collection> ...`: positional parameters become a record using
//!   the collection's field order ([`field_order`])
//! - `SELECT ... FROM <collection> ...`: every record in the collection
//!
//! WHERE, ORDER BY, LIMIT and joins are NOT interpreted: a filtered query returns
//! the whole collection unfiltered. Anything else is logged and yields an empty
//! result. Callers on this engine must treat results as best-effort.

use chrono::Utc;
use rusqlite::types::Value;
use serde_json::Value as JsonValue;

use super::document::{DocumentStore, Record};
use super::row::value_to_json;
use super::{preview, Engine, EngineKind, Row, RunResult};
use crate::error::StoreResult;

/// Collections the fallback store is opened with.
pub const COLLECTIONS: [&str; 5] = ["patients", "observations", "encounters", "documents", "tasks"];

/// Positional parameter order for `INSERT INTO <collection>`.
pub fn field_order(collection: &str) -> Option<&'static [&'static str]> {
    match collection {
        "patients" => Some(&["id", "name", "birthDate", "gender", "active"]),
        "observations" => Some(&["id", "patientId", "code", "value", "issued", "status", "category"]),
        "encounters" => Some(&["id", "patientId", "status", "class", "period", "reasonCode"]),
        "documents" => Some(&["id", "patientId", "type", "content", "created", "size"]),
        "tasks" => Some(&["id", "patientId", "status", "intent", "description", "authoredOn"]),
        _ => None,
    }
}

/// A statement as understood by the shim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert { collection: &'static str },
    Select { collection: &'static str },
    Unrecognized,
}

/// Classify a statement. Only collections in [`COLLECTIONS`] are recognized.
pub fn parse_statement(sql: &str) -> Statement {
    let lower = sql.trim().to_lowercase();

    if let Some(rest) = lower.strip_prefix("insert into ") {
        return match known_collection(first_identifier(rest)) {
            Some(collection) => Statement::Insert { collection },
            None => Statement::Unrecognized,
        };
    }

    if lower.starts_with("select") {
        let target = lower
            .split_whitespace()
            .skip_while(|word| *word != "from")
            .nth(1)
            .unwrap_or("");
        return match known_collection(first_identifier(target)) {
            Some(collection) => Statement::Select { collection },
            None => Statement::Unrecognized,
        };
    }

    Statement::Unrecognized
}

/// Table or collection name a statement targets, lowercased, if one can be found.
pub fn target_name(sql: &str) -> Option<String> {
    let lower = sql.trim().to_lowercase();
    let mut words = lower.split_whitespace();
    while let Some(word) = words.next() {
        if word == "from" || word == "into" {
            let name = first_identifier(words.next()?);
            return (!name.is_empty()).then(|| name.to_string());
        }
    }
    None
}

fn first_identifier(text: &str) -> &str {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

fn known_collection(name: &str) -> Option<&'static str> {
    COLLECTIONS.iter().copied().find(|c| *c == name)
}

/// Build a record from positional parameters, filling documented defaults.
pub fn build_record(collection: &str, params: &[Value]) -> Record {
    let fields = field_order(collection).unwrap_or(&[]);
    let mut record = Record::new();
    for (i, field) in fields.iter().enumerate() {
        let value = params.get(i).map(value_to_json).unwrap_or(JsonValue::Null);
        record.insert(field.to_string(), value);
    }

    let now = crate::timestamp_now();
    match collection {
        "patients" => {
            let fallback_id = format!("patient-{}", Utc::now().timestamp_millis());
            default_if_blank(&mut record, "id", fallback_id);
            default_if_blank(&mut record, "name", "Unknown Patient");
            default_if_blank(&mut record, "birthDate", "1990-01-01");
            default_if_blank(&mut record, "gender", "unknown");
            if params.len() < 5 {
                record.insert("active".into(), JsonValue::from(1));
            }
            record.insert("lastUpdated".into(), JsonValue::String(now));
        }
        "observations" => {
            let fallback_id = format!("obs-{}", Utc::now().timestamp_millis());
            default_if_blank(&mut record, "id", fallback_id);
            default_if_blank(&mut record, "patientId", "unknown");
            default_if_blank(&mut record, "code", "unknown");
            default_if_blank(&mut record, "value", "");
            default_if_blank(&mut record, "issued", now);
            default_if_blank(&mut record, "status", "final");
            default_if_blank(&mut record, "category", "vital-signs");
        }
        other => {
            let fallback_id = format!("{other}-{}", uuid::Uuid::now_v7());
            default_if_blank(&mut record, "id", fallback_id);
        }
    }
    record
}

fn default_if_blank(record: &mut Record, field: &str, fallback: impl Into<String>) {
    let blank = match record.get(field) {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::String(s)) => s.is_empty(),
        Some(_) => false,
    };
    if blank {
        record.insert(field.to_string(), JsonValue::String(fallback.into()));
    }
}

/// Shim engine: the four statement methods translated onto a [`DocumentStore`].
pub struct ShimEngine {
    store: DocumentStore,
}

enum ShimOutput {
    Inserted(RunResult),
    Rows(Vec<Row>),
    Nothing,
}

impl ShimEngine {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    fn execute(&self, sql: &str, params: &[Value]) -> StoreResult<ShimOutput> {
        match parse_statement(sql) {
            Statement::Insert { collection } => {
                let record = build_record(collection, params);
                let len = self.store.add(collection, record).inspect_err(|e| {
                    tracing::error!(collection, error = %e, "document insert failed");
                })?;
                Ok(ShimOutput::Inserted(RunResult {
                    changes: 1,
                    last_insert_id: len as i64,
                }))
            }
            Statement::Select { collection } => {
                let rows = self
                    .store
                    .to_array(collection)?
                    .iter()
                    .map(Row::from_json)
                    .collect();
                Ok(ShimOutput::Rows(rows))
            }
            Statement::Unrecognized => {
                tracing::info!(sql = %preview(sql), "unhandled statement on document store");
                Ok(ShimOutput::Nothing)
            }
        }
    }
}

impl Engine for ShimEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::SchemalessShim
    }

    fn exec(&self, sql: &str) -> StoreResult<()> {
        self.execute(sql, &[]).map(|_| ())
    }

    fn run(&self, sql: &str, params: &[Value]) -> StoreResult<RunResult> {
        match self.execute(sql, params)? {
            ShimOutput::Inserted(result) => Ok(result),
            ShimOutput::Rows(_) | ShimOutput::Nothing => Ok(RunResult::default()),
        }
    }

    fn get(&self, sql: &str, params: &[Value]) -> StoreResult<Option<Row>> {
        match self.execute(sql, params)? {
            ShimOutput::Rows(rows) => Ok(rows.into_iter().next()),
            ShimOutput::Inserted(_) | ShimOutput::Nothing => Ok(None),
        }
    }

    fn all(&self, sql: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        match self.execute(sql, params)? {
            ShimOutput::Rows(rows) => Ok(rows),
            ShimOutput::Inserted(_) | ShimOutput::Nothing => Ok(Vec::new()),
        }
    }

    fn export(&self) -> StoreResult<Vec<u8>> {
        tracing::info!("export requested on document store (not supported)");
        Ok(Vec::new())
    }
}

//! Engine-agnostic result rows.
//!
//! Every engine variant returns [`Row`]s: an ordered list of column name / value
//! pairs using [`rusqlite::types::Value`] as the cell type. Document records are
//! converted through [`Row::from_json`] and [`Row::to_json`].

use base64::Engine as _;
use rusqlite::types::Value;
use serde_json::{Map, Value as JsonValue};

/// Outcome of a mutation statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Number of rows inserted, updated or deleted.
    pub changes: usize,
    /// Rowid (or engine-specific id) of the last inserted record.
    pub last_insert_id: i64,
}

/// A single result row, preserving column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.columns.push((column.into(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Text view of a column. Numbers are rendered; NULL and blobs are `None`.
    pub fn text(&self, column: &str) -> Option<String> {
        match self.get(column)? {
            Value::Text(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Null | Value::Blob(_) => None,
        }
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        match self.get(column)? {
            Value::Integer(i) => Some(*i),
            Value::Real(f) => Some(*f as i64),
            Value::Text(s) => s.parse().ok(),
            Value::Null | Value::Blob(_) => None,
        }
    }

    pub fn blob(&self, column: &str) -> Option<&[u8]> {
        match self.get(column)? {
            Value::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Move a blob column out of the row.
    pub fn take_blob(&mut self, column: &str) -> Option<Vec<u8>> {
        let slot = self
            .columns
            .iter_mut()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)?;
        match std::mem::replace(slot, Value::Null) {
            Value::Blob(bytes) => Some(bytes),
            other => {
                *slot = other;
                None
            }
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Build a row from a document record.
    pub fn from_json(record: &Map<String, JsonValue>) -> Self {
        let mut row = Row::new();
        for (key, value) in record {
            row.push(key.clone(), json_to_value(value));
        }
        row
    }

    /// Render the row as a JSON object. Blobs become base64 strings.
    pub fn to_json(&self) -> Map<String, JsonValue> {
        self.columns
            .iter()
            .map(|(name, value)| (name.clone(), value_to_json(value)))
            .collect()
    }
}

/// Convert a SQL cell into a JSON value.
pub fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::from(*i),
        Value::Real(f) => serde_json::Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Blob(bytes) => {
            JsonValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}

/// Convert a JSON value into a SQL cell. Nested structures are kept as JSON text.
pub fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Integer(i64::from(*b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => Value::Text(s.clone()),
        other => Value::Text(other.to_string()),
    }
}

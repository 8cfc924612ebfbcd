//! Clinical record types.
//!
//! Each type maps one table of the schema. Field names serialize in camelCase
//! to match the column names, and every type can be rebuilt from a [`Row`]
//! returned by any engine. Row decoding is tolerant: the fallback engines may
//! return records with missing or differently-typed columns.

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::db::Row;

/// A patient demographic record. Upserted by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    /// Phone or email contact, free text.
    pub telecom: Option<String>,
}

impl Patient {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id").unwrap_or_default(),
            name: row.text("name").unwrap_or_default(),
            birth_date: row.text("birthDate"),
            gender: row.text("gender"),
            telecom: row.text("telecom"),
        }
    }
}

/// A coded measurement such as a vital sign or lab result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    pub id: String,
    pub patient_id: String,
    pub code: String,
    pub display: Option<String>,
    pub value: Option<String>,
    pub unit: Option<String>,
    /// RFC 3339 time the observation was issued.
    pub issued: String,
}

impl Observation {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id").unwrap_or_default(),
            patient_id: row.text("patientId").unwrap_or_default(),
            code: row.text("code").unwrap_or_default(),
            display: row.text("display"),
            value: row.text("value"),
            unit: row.text("unit"),
            issued: row.text("issued").unwrap_or_default(),
        }
    }
}

/// A diagnosis or problem-list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub id: String,
    pub patient_id: String,
    pub code: String,
    pub display: Option<String>,
    pub onset_date_time: Option<String>,
    pub recorded_date: String,
}

impl Condition {
    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id").unwrap_or_default(),
            patient_id: row.text("patientId").unwrap_or_default(),
            code: row.text("code").unwrap_or_default(),
            display: row.text("display"),
            onset_date_time: row.text("onsetDateTime"),
            recorded_date: row.text("recordedDate").unwrap_or_default(),
        }
    }
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// One message in a patient's chat thread. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Assigned by the engine on insert.
    pub id: Option<i64>,
    pub patient_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: String,
    /// Attachment and resource references, stored as JSON text.
    pub metadata: Option<serde_json::Value>,
}

impl ChatMessage {
    pub fn new(patient_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            patient_id: patient_id.into(),
            role,
            content: content.into(),
            timestamp: crate::timestamp_now(),
            metadata: None,
        }
    }

    pub fn from_row(row: &Row) -> Self {
        let metadata = match row.get("metadata") {
            Some(Value::Text(raw)) => serde_json::from_str(raw).ok(),
            _ => None,
        };
        Self {
            id: row.integer("id"),
            patient_id: row.text("patientId").unwrap_or_default(),
            role: row
                .text("role")
                .and_then(|r| r.parse().ok())
                .unwrap_or(Role::User),
            content: row.text("content").unwrap_or_default(),
            timestamp: row.text("timestamp").unwrap_or_default(),
            metadata,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("unknown task status: {s}")),
        }
    }
}

/// A care task. `completed_at` is managed by [`super::save_task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub patient_id: String,
    pub description: String,
    pub status: TaskStatus,
    pub assigned_to: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl Task {
    /// A new pending task with a time-sortable id.
    pub fn new(patient_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            patient_id: patient_id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            assigned_to: None,
            created_at: crate::timestamp_now(),
            completed_at: None,
        }
    }

    pub fn from_row(row: &Row) -> Self {
        Self {
            id: row.text("id").unwrap_or_default(),
            patient_id: row.text("patientId").unwrap_or_default(),
            description: row.text("description").unwrap_or_default(),
            status: row
                .text("status")
                .and_then(|s| s.parse().ok())
                .unwrap_or(TaskStatus::Pending),
            assigned_to: row.text("assignedTo"),
            created_at: row.text("createdAt").unwrap_or_default(),
            completed_at: row.text("completedAt"),
        }
    }
}

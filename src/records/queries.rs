//! Typed accessors over the live engine.
//!
//! Every function resolves the engine through [`Database::with_engine`], so a
//! call made before initialization (or after shutdown) fails with
//! [`StoreError::NotInitialized`](crate::StoreError::NotInitialized). Failures on
//! a ready engine are logged and returned to the caller; nothing here retries.
//!
//! Against the schemaless fallback these statements fall outside the shim's
//! grammar, so writes are dropped and reads come back empty. Against the mock
//! engine reads return the seeded demo data.

use rusqlite::types::Value;
use tracing::{debug, error};

use super::types::{ChatMessage, Condition, Observation, Patient, Task, TaskStatus};
use crate::error::StoreResult;
use crate::Database;

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

/// Insert or replace a patient by id.
pub async fn save_patient(db: &Database, patient: &Patient) -> StoreResult<()> {
    let id = patient.id.clone();
    let params = vec![
        text(&patient.id),
        text(&patient.name),
        opt_text(patient.birth_date.as_deref()),
        opt_text(patient.gender.as_deref()),
        opt_text(patient.telecom.as_deref()),
    ];
    db.with_engine(move |engine| {
        engine.run(
            "INSERT OR REPLACE INTO Patient (id, name, birthDate, gender, telecom) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            &params,
        )
    })
    .await
    .inspect_err(|e| error!(patient_id = %id, error = %e, "failed to save patient"))?;
    debug!(patient_id = %patient.id, "patient saved");
    Ok(())
}

pub async fn get_patient(db: &Database, id: &str) -> StoreResult<Option<Patient>> {
    let params = vec![text(id)];
    let row = db
        .with_engine(move |engine| engine.get("SELECT * FROM Patient WHERE id = ?1", &params))
        .await
        .inspect_err(|e| error!(patient_id = %id, error = %e, "failed to load patient"))?;
    Ok(row.as_ref().map(Patient::from_row))
}

/// Append a message to the patient's thread. Returns the assigned id.
pub async fn add_chat_message(db: &Database, message: &ChatMessage) -> StoreResult<i64> {
    let metadata = message
        .metadata
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let params = vec![
        text(&message.patient_id),
        text(message.role.as_str()),
        text(&message.content),
        text(&message.timestamp),
        opt_text(metadata.as_deref()),
    ];
    let result = db
        .with_engine(move |engine| {
            engine.run(
                "INSERT INTO ChatMessage (patientId, role, content, timestamp, metadata) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &params,
            )
        })
        .await
        .inspect_err(|e| {
            error!(patient_id = %message.patient_id, error = %e, "failed to add chat message")
        })?;
    Ok(result.last_insert_id)
}

/// The patient's thread, oldest first.
pub async fn get_chat_messages(db: &Database, patient_id: &str) -> StoreResult<Vec<ChatMessage>> {
    let params = vec![text(patient_id)];
    let rows = db
        .with_engine(move |engine| {
            engine.all(
                "SELECT * FROM ChatMessage WHERE patientId = ?1 ORDER BY timestamp",
                &params,
            )
        })
        .await
        .inspect_err(|e| error!(patient_id, error = %e, "failed to load chat messages"))?;
    Ok(rows.iter().map(ChatMessage::from_row).collect())
}

pub async fn save_observation(db: &Database, observation: &Observation) -> StoreResult<()> {
    let params = vec![
        text(&observation.id),
        text(&observation.patient_id),
        text(&observation.code),
        opt_text(observation.display.as_deref()),
        opt_text(observation.value.as_deref()),
        opt_text(observation.unit.as_deref()),
        text(&observation.issued),
    ];
    db.with_engine(move |engine| {
        engine.run(
            "INSERT OR REPLACE INTO Observation \
             (id, patientId, code, display, value, unit, issued) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            &params,
        )
    })
    .await
    .inspect_err(|e| error!(observation_id = %observation.id, error = %e, "failed to save observation"))?;
    Ok(())
}

/// The patient's observations, most recently issued first.
pub async fn get_observations(db: &Database, patient_id: &str) -> StoreResult<Vec<Observation>> {
    let params = vec![text(patient_id)];
    let rows = db
        .with_engine(move |engine| {
            engine.all(
                "SELECT * FROM Observation WHERE patientId = ?1 ORDER BY issued DESC",
                &params,
            )
        })
        .await
        .inspect_err(|e| error!(patient_id, error = %e, "failed to load observations"))?;
    Ok(rows.iter().map(Observation::from_row).collect())
}

pub async fn save_condition(db: &Database, condition: &Condition) -> StoreResult<()> {
    let params = vec![
        text(&condition.id),
        text(&condition.patient_id),
        text(&condition.code),
        opt_text(condition.display.as_deref()),
        opt_text(condition.onset_date_time.as_deref()),
        text(&condition.recorded_date),
    ];
    db.with_engine(move |engine| {
        engine.run(
            "INSERT OR REPLACE INTO Condition \
             (id, patientId, code, display, onsetDateTime, recordedDate) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &params,
        )
    })
    .await
    .inspect_err(|e| error!(condition_id = %condition.id, error = %e, "failed to save condition"))?;
    Ok(())
}

/// The patient's conditions, most recently recorded first.
pub async fn get_conditions(db: &Database, patient_id: &str) -> StoreResult<Vec<Condition>> {
    let params = vec![text(patient_id)];
    let rows = db
        .with_engine(move |engine| {
            engine.all(
                "SELECT * FROM Condition WHERE patientId = ?1 ORDER BY recordedDate DESC",
                &params,
            )
        })
        .await
        .inspect_err(|e| error!(patient_id, error = %e, "failed to load conditions"))?;
    Ok(rows.iter().map(Condition::from_row).collect())
}

/// Resolve `completedAt` for a task about to be written, given the stored row.
fn resolve_completed_at(task: &Task, previous: Option<&Task>) -> Option<String> {
    if task.status != TaskStatus::Completed {
        return None;
    }
    match previous {
        Some(prev) if prev.status == TaskStatus::Completed => prev
            .completed_at
            .clone()
            .or_else(|| task.completed_at.clone())
            .or_else(|| Some(crate::timestamp_now())),
        _ => Some(crate::timestamp_now()),
    }
}

/// Insert or replace a task by id and return it as stored.
///
/// `completedAt` is stamped when the task moves into `completed`, kept while it
/// stays completed, and cleared for every other status.
pub async fn save_task(db: &Database, task: &Task) -> StoreResult<Task> {
    let task = task.clone();
    db.with_engine(move |engine| {
        let previous = engine
            .get(
                "SELECT * FROM Task WHERE id = ?1",
                &[Value::Text(task.id.clone())],
            )?
            .map(|row| Task::from_row(&row))
            .filter(|prev| prev.id == task.id);

        let mut stored = task;
        stored.completed_at = resolve_completed_at(&stored, previous.as_ref());
        engine.run(
            "INSERT OR REPLACE INTO Task \
             (id, patientId, description, status, assignedTo, createdAt, completedAt) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            &[
                text(&stored.id),
                text(&stored.patient_id),
                text(&stored.description),
                text(stored.status.as_str()),
                opt_text(stored.assigned_to.as_deref()),
                text(&stored.created_at),
                opt_text(stored.completed_at.as_deref()),
            ],
        )?;
        Ok(stored)
    })
    .await
    .inspect_err(|e| error!(error = %e, "failed to save task"))
}

/// The patient's tasks, newest first.
pub async fn get_tasks(db: &Database, patient_id: &str) -> StoreResult<Vec<Task>> {
    let params = vec![text(patient_id)];
    let rows = db
        .with_engine(move |engine| {
            engine.all(
                "SELECT * FROM Task WHERE patientId = ?1 ORDER BY createdAt DESC",
                &params,
            )
        })
        .await
        .inspect_err(|e| error!(patient_id, error = %e, "failed to load tasks"))?;
    Ok(rows.iter().map(Task::from_row).collect())
}

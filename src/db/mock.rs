//! Last-resort in-memory engine.
//!
//! Always constructible. Holds one demonstration patient and one demonstration
//! observation; reads of those tables return the seed data, everything else is
//! logged and answered with an empty result. Writes are accepted and dropped.

use serde::Serialize;
use serde_json::json;

use rusqlite::types::Value;

use super::document::Record;
use super::shim::target_name;
use super::{preview, Engine, EngineKind, Row, RunResult};
use crate::error::StoreResult;

#[derive(Debug, Clone, Serialize)]
struct MockData {
    patients: Vec<Record>,
    observations: Vec<Record>,
    encounters: Vec<Record>,
    documents: Vec<Record>,
    tasks: Vec<Record>,
}

pub struct MockEngine {
    data: MockData,
}

/// Which seeded table a statement refers to.
enum SeedTable {
    Patients,
    Observations,
    Other,
}

fn seed_table(sql: &str) -> SeedTable {
    match target_name(sql).as_deref() {
        Some("patient" | "patients") => SeedTable::Patients,
        Some("observation" | "observations") => SeedTable::Observations,
        _ => SeedTable::Other,
    }
}

fn object(value: serde_json::Value) -> Record {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Record::new(),
    }
}

impl MockEngine {
    pub const DEMO_PATIENT_ID: &'static str = "patient-demo-001";

    pub fn seeded() -> Self {
        let now = crate::timestamp_now();
        let patient = object(json!({
            "id": Self::DEMO_PATIENT_ID,
            "name": "John Doe",
            "birthDate": "1985-03-15",
            "gender": "male",
            "active": 1,
            "lastUpdated": now,
        }));
        let observation = object(json!({
            "id": "obs-demo-001",
            "patientId": Self::DEMO_PATIENT_ID,
            "code": "blood-pressure",
            "value": "120/80 mmHg",
            "issued": now,
            "status": "final",
            "category": "vital-signs",
        }));

        Self {
            data: MockData {
                patients: vec![patient],
                observations: vec![observation],
                encounters: Vec::new(),
                documents: Vec::new(),
                tasks: Vec::new(),
            },
        }
    }
}

impl Engine for MockEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Mock
    }

    fn exec(&self, sql: &str) -> StoreResult<()> {
        tracing::info!(sql = %preview(sql), "mock exec");
        Ok(())
    }

    fn run(&self, sql: &str, _params: &[Value]) -> StoreResult<RunResult> {
        tracing::info!(sql = %preview(sql), "mock run (discarded)");
        Ok(RunResult {
            changes: 0,
            last_insert_id: chrono::Utc::now().timestamp_millis(),
        })
    }

    fn get(&self, sql: &str, _params: &[Value]) -> StoreResult<Option<Row>> {
        tracing::info!(sql = %preview(sql), "mock get");
        Ok(match seed_table(sql) {
            SeedTable::Patients => self.data.patients.first().map(Row::from_json),
            SeedTable::Observations | SeedTable::Other => None,
        })
    }

    fn all(&self, sql: &str, _params: &[Value]) -> StoreResult<Vec<Row>> {
        tracing::info!(sql = %preview(sql), "mock all");
        let records = match seed_table(sql) {
            SeedTable::Patients => &self.data.patients,
            SeedTable::Observations => &self.data.observations,
            SeedTable::Other => return Ok(Vec::new()),
        };
        Ok(records.iter().map(Row::from_json).collect())
    }

    fn export(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.data)?)
    }

    fn close(&self) {
        tracing::info!("mock database closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_patient_is_returned() {
        let engine = MockEngine::seeded();
        let row = engine
            .get("SELECT * FROM Patient WHERE id = ?1", &[Value::Text("x".into())])
            .unwrap()
            .unwrap();
        assert_eq!(row.text("id").as_deref(), Some(MockEngine::DEMO_PATIENT_ID));
        assert_eq!(row.text("name").as_deref(), Some("John Doe"));
        assert_eq!(engine.all("select * from patients", &[]).unwrap().len(), 1);
    }

    #[test]
    fn observations_do_not_leak_into_patient_queries() {
        let engine = MockEngine::seeded();
        let obs = engine
            .all("SELECT * FROM Observation WHERE patientId = ?1", &[])
            .unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].text("code").as_deref(), Some("blood-pressure"));

        // patientId appears in the WHERE clause but the target table decides.
        let chat = engine
            .all("SELECT * FROM ChatMessage WHERE patientId = ?1", &[])
            .unwrap();
        assert!(chat.is_empty());
    }

    #[test]
    fn writes_are_discarded() {
        let engine = MockEngine::seeded();
        let result = engine
            .run("INSERT INTO Task (id) VALUES (?1)", &[Value::Text("t".into())])
            .unwrap();
        assert_eq!(result.changes, 0);
        assert!(engine.all("SELECT * FROM Task", &[]).unwrap().is_empty());
        assert!(engine.get("SELECT * FROM Task", &[]).unwrap().is_none());
    }

    #[test]
    fn export_is_seed_json() {
        let engine = MockEngine::seeded();
        let bytes = engine.export().unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["patients"][0]["id"], MockEngine::DEMO_PATIENT_ID);
        assert!(parsed["tasks"].as_array().unwrap().is_empty());
    }
}

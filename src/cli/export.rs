use anyhow::Result;
use serde::Serialize;

use medthread_store::files::{self, StoredFile};
use medthread_store::records::{self, ChatMessage, Condition, Observation, Patient, Task};
use medthread_store::Database;

/// Export format: everything stored for one patient. File payloads are omitted.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PatientExport {
    engine: String,
    patient: Option<Patient>,
    observations: Vec<Observation>,
    conditions: Vec<Condition>,
    tasks: Vec<Task>,
    chat_messages: Vec<ChatMessage>,
    files: Vec<StoredFile>,
}

/// Export one patient's records as JSON to stdout.
pub async fn export(db: &Database, patient_id: &str) -> Result<()> {
    let handle = db.initialize().await?;

    let data = PatientExport {
        engine: handle.kind().to_string(),
        patient: records::get_patient(db, patient_id).await?,
        observations: records::get_observations(db, patient_id).await?,
        conditions: records::get_conditions(db, patient_id).await?,
        tasks: records::get_tasks(db, patient_id).await?,
        chat_messages: records::get_chat_messages(db, patient_id).await?,
        files: files::list_patient_files(db, patient_id).await?,
    };

    let json = serde_json::to_string_pretty(&data)?;
    println!("{json}");

    eprintln!(
        "Exported patient {patient_id}: {} observations, {} conditions, {} tasks, {} messages, {} files",
        data.observations.len(),
        data.conditions.len(),
        data.tasks.len(),
        data.chat_messages.len(),
        data.files.len()
    );
    Ok(())
}

//! CLI `files` subcommands: manage a patient's attachments.

use std::path::Path;

use anyhow::{bail, Context, Result};

use medthread_store::files::{self, FileUpload, UploadOutcome};
use medthread_store::Database;

pub async fn list(db: &Database, patient_id: &str) -> Result<()> {
    db.initialize().await?;
    let stored = files::list_patient_files(db, patient_id).await?;

    if stored.is_empty() {
        println!("No files for patient {patient_id}.");
        return Ok(());
    }
    for file in &stored {
        println!(
            "{}  {:<32} {:<12} {}",
            file.id,
            file.filename,
            files::format_file_size(file.size),
            file.uploaded_at
        );
    }
    Ok(())
}

pub async fn store(db: &Database, patient_id: &str, path: &Path) -> Result<()> {
    db.initialize().await?;
    let upload = FileUpload::from_path(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    match files::store_file(db, &upload, patient_id).await? {
        UploadOutcome::Stored(file) => {
            println!(
                "Stored {} ({}) as {}",
                file.filename,
                files::format_file_size(file.size),
                file.id
            );
            Ok(())
        }
        UploadOutcome::Rejected { error } => bail!("upload rejected: {error}"),
    }
}

/// Write a stored file's payload to `out`.
pub async fn get(db: &Database, file_id: &str, out: &Path) -> Result<()> {
    db.initialize().await?;
    let Some(file) = files::get_file(db, file_id).await? else {
        bail!("no file with id {file_id}");
    };
    let data = file.data.unwrap_or_default();
    tokio::fs::write(out, &data)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!(
        "Wrote {} ({}) to {}",
        file.filename,
        files::format_file_size(data.len() as u64),
        out.display()
    );
    Ok(())
}

pub async fn delete(db: &Database, file_id: &str) -> Result<()> {
    db.initialize().await?;
    if files::delete_file(db, file_id).await? {
        println!("Deleted {file_id}.");
    } else {
        println!("No file with id {file_id}.");
    }
    Ok(())
}

pub async fn stats(db: &Database, patient_id: &str) -> Result<()> {
    db.initialize().await?;
    let stats = files::storage_stats(db, patient_id).await?;
    println!("Files:       {}", stats.total_files);
    println!("Total size:  {}", files::format_file_size(stats.total_size));
    Ok(())
}

//! CLI `status` command: initialize storage and print which engine was chosen.

use anyhow::Result;

use medthread_store::files::format_file_size;
use medthread_store::{Database, EngineKind};

pub async fn status(db: &Database) -> Result<()> {
    let handle = db.initialize().await?;
    let config = db.config();

    println!("MedThread Storage Status");
    println!("========================");
    println!();
    println!("Data directory:    {}", config.resolved_data_dir().display());
    println!("Engine:            {}", handle.kind());
    match handle.last_backup_at() {
        Some(at) => println!("Last backup:       {}", at.to_rfc3339()),
        None => println!("Last backup:       (never)"),
    }
    println!(
        "Auto-backup:       {}",
        if db.backup_running() {
            format!("every {}s", config.backup.interval_secs)
        } else {
            "off".to_string()
        }
    );

    let history = db.snapshots().history()?;
    if !history.is_empty() {
        println!();
        println!("Backup history ({} kept):", history.len());
        for entry in history.iter().take(5) {
            println!("  {}  {}", entry.timestamp, format_file_size(entry.size));
        }
    }

    if !handle.failures().is_empty() {
        println!();
        println!("Initialization errors:");
        for failure in handle.failures() {
            println!("  {failure}");
        }
    }

    match handle.kind() {
        EngineKind::EmbeddedSql => {
            if let Some(report) = db.integrity_report().await? {
                println!();
                println!("Tables:            {}", report.tables.join(", "));
                if !report.missing_tables.is_empty() {
                    println!("Missing tables:    {}", report.missing_tables.join(", "));
                }
                if report.integrity_ok {
                    println!("Integrity check:   PASSED");
                } else {
                    println!("Integrity check:   FAILED ({})", report.integrity_details);
                }
            }
        }
        EngineKind::SchemalessShim => {
            println!();
            println!("WARNING: running on the document store fallback.");
            println!("  Filtered and ordered queries return whole collections.");
        }
        EngineKind::Mock => {
            println!();
            println!("WARNING: running on the mock engine. Nothing will be saved.");
        }
    }

    Ok(())
}

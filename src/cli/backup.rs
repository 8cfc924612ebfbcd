use anyhow::Result;

use medthread_store::files::format_file_size;
use medthread_store::Database;

/// Write a snapshot of the embedded engine now.
pub async fn backup(db: &Database) -> Result<()> {
    let handle = db.initialize().await?;

    match db.backup_now().await? {
        Some(snapshot) => {
            println!(
                "Backup written: {} at {}",
                format_file_size(snapshot.data.len() as u64),
                snapshot.timestamp.to_rfc3339()
            );
            println!("Snapshot file:  {}", db.config().snapshot_path().display());
        }
        None => {
            println!(
                "Backup skipped: the {} engine cannot be exported.",
                handle.kind()
            );
        }
    }
    Ok(())
}

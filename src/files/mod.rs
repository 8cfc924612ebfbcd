//! File attachment storage.
//!
//! Files are rows in `DocumentReference` holding the raw payload. Uploads are
//! validated against [`FilesConfig`] before anything is written; a rejected
//! upload is an [`UploadOutcome::Rejected`], not an error. Listings return
//! metadata only, with `size` computed by the engine from the stored payload.

pub mod urls;

use std::path::Path;

use rusqlite::types::Value;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::FilesConfig;
use crate::db::Row;
use crate::error::StoreResult;
use crate::Database;

/// A file about to be stored.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read a file from disk, inferring its MIME type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, mime_from_path(path), data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// MIME type for a file extension; `application/octet-stream` when unknown.
pub fn mime_from_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// A stored file. `data` is present only when loaded by id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    pub patient_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size: u64,
    pub uploaded_at: String,
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

impl StoredFile {
    fn from_row(mut row: Row) -> Self {
        let data = row.take_blob("data");
        let size = match &data {
            Some(bytes) => bytes.len() as u64,
            None => row.integer("size").unwrap_or(0).max(0) as u64,
        };
        Self {
            id: row.text("id").unwrap_or_default(),
            patient_id: row.text("patientId").unwrap_or_default(),
            filename: row.text("filename").unwrap_or_default(),
            mime_type: row.text("mimeType").unwrap_or_default(),
            size,
            uploaded_at: row.text("uploadedAt").unwrap_or_default(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileValidation {
    fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    fn rejected(error: String) -> Self {
        Self {
            valid: false,
            error: Some(error),
        }
    }
}

/// Result of [`store_file`].
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Stored(StoredFile),
    Rejected { error: String },
}

impl UploadOutcome {
    pub fn into_stored(self) -> Option<StoredFile> {
        match self {
            Self::Stored(file) => Some(file),
            Self::Rejected { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_files: u64,
    pub total_size: u64,
}

const MIB: u64 = 1024 * 1024;

/// Check size ceiling and MIME allow-list.
pub fn validate_file(file: &FileUpload, config: &FilesConfig) -> FileValidation {
    let size = file.size();
    if size > config.max_file_size {
        let limit = config.max_file_size / MIB;
        let actual = (size as f64 / MIB as f64).round() as u64;
        return FileValidation::rejected(format!(
            "File size exceeds {limit}MB limit ({actual}MB)"
        ));
    }
    if !config
        .allowed_mime_types
        .iter()
        .any(|allowed| allowed == &file.mime_type)
    {
        return FileValidation::rejected(format!("File type not supported: {}", file.mime_type));
    }
    FileValidation::ok()
}

/// Validate and store an upload for `patient_id`.
pub async fn store_file(
    db: &Database,
    file: &FileUpload,
    patient_id: &str,
) -> StoreResult<UploadOutcome> {
    let validation = validate_file(file, &db.config().files);
    if let Some(error) = validation.error {
        warn!(filename = %file.name, %error, "upload rejected");
        return Ok(UploadOutcome::Rejected { error });
    }

    let stored = StoredFile {
        id: uuid::Uuid::now_v7().to_string(),
        patient_id: patient_id.to_string(),
        filename: file.name.clone(),
        mime_type: file.mime_type.clone(),
        size: file.size(),
        uploaded_at: crate::timestamp_now(),
        data: Some(file.data.clone()),
    };
    let params = vec![
        Value::Text(stored.id.clone()),
        Value::Text(stored.patient_id.clone()),
        Value::Text(stored.filename.clone()),
        Value::Text(stored.mime_type.clone()),
        Value::Blob(file.data.clone()),
        Value::Text(stored.uploaded_at.clone()),
    ];
    db.with_engine(move |engine| {
        engine.run(
            "INSERT INTO DocumentReference (id, patientId, filename, mimeType, data, uploadedAt) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            &params,
        )
    })
    .await
    .inspect_err(|e| error!(filename = %file.name, error = %e, "failed to store file"))?;

    info!(file_id = %stored.id, filename = %stored.filename, bytes = stored.size, "file stored");
    Ok(UploadOutcome::Stored(stored))
}

/// Full row including payload, or `None` if no file has this id.
pub async fn get_file(db: &Database, file_id: &str) -> StoreResult<Option<StoredFile>> {
    let params = vec![Value::Text(file_id.to_string())];
    let row = db
        .with_engine(move |engine| {
            engine.get(
                "SELECT id, patientId, filename, mimeType, data, uploadedAt \
                 FROM DocumentReference WHERE id = ?1",
                &params,
            )
        })
        .await
        .inspect_err(|e| error!(file_id, error = %e, "failed to retrieve file"))?;
    Ok(row.map(StoredFile::from_row))
}

/// Metadata for every file of a patient, newest upload first. Payloads are not loaded.
pub async fn list_patient_files(db: &Database, patient_id: &str) -> StoreResult<Vec<StoredFile>> {
    let params = vec![Value::Text(patient_id.to_string())];
    let rows = db
        .with_engine(move |engine| {
            engine.all(
                "SELECT id, patientId, filename, mimeType, LENGTH(data) AS size, uploadedAt \
                 FROM DocumentReference WHERE patientId = ?1 ORDER BY uploadedAt DESC",
                &params,
            )
        })
        .await
        .inspect_err(|e| error!(patient_id, error = %e, "failed to list patient files"))?;
    Ok(rows.into_iter().map(StoredFile::from_row).collect())
}

/// Returns `true` if a row was removed.
pub async fn delete_file(db: &Database, file_id: &str) -> StoreResult<bool> {
    let params = vec![Value::Text(file_id.to_string())];
    let result = db
        .with_engine(move |engine| {
            engine.run("DELETE FROM DocumentReference WHERE id = ?1", &params)
        })
        .await
        .inspect_err(|e| error!(file_id, error = %e, "failed to delete file"))?;

    let deleted = result.changes > 0;
    if deleted {
        info!(file_id, "file deleted");
    }
    Ok(deleted)
}

pub async fn storage_stats(db: &Database, patient_id: &str) -> StoreResult<StorageStats> {
    let params = vec![Value::Text(patient_id.to_string())];
    let row = db
        .with_engine(move |engine| {
            engine.get(
                "SELECT COUNT(*) AS count, COALESCE(SUM(LENGTH(data)), 0) AS totalSize \
                 FROM DocumentReference WHERE patientId = ?1",
                &params,
            )
        })
        .await
        .inspect_err(|e| error!(patient_id, error = %e, "failed to compute storage stats"))?;

    Ok(row
        .map(|row| StorageStats {
            total_files: row.integer("count").unwrap_or(0).max(0) as u64,
            total_size: row.integer("totalSize").unwrap_or(0).max(0) as u64,
        })
        .unwrap_or_default())
}

/// Pin the file's payload behind a `blob:` URL. Release with [`revoke_transient_url`].
pub fn create_transient_url(db: &Database, file: &StoredFile) -> StoreResult<String> {
    db.blob_urls().create(file)
}

pub fn revoke_transient_url(db: &Database, url: &str) -> bool {
    db.blob_urls().revoke(url)
}

/// Human-readable size: `0 Bytes`, `1.5 KB`, `10 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut exp = 0;
    while exp < UNITS.len() - 1 && bytes >= 1024u64.pow(exp as u32 + 1) {
        exp += 1;
    }
    let scaled = bytes as f64 / 1024f64.powi(exp as i32);
    let rounded = (scaled * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[exp])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages() {
        let config = FilesConfig::default();

        let big = FileUpload::new("scan.pdf", "application/pdf", vec![0; 11 * 1024 * 1024]);
        let result = validate_file(&big, &config);
        assert!(!result.valid);
        assert_eq!(
            result.error.as_deref(),
            Some("File size exceeds 10MB limit (11MB)")
        );

        let zip = FileUpload::new("bundle.zip", "application/zip", vec![1, 2, 3]);
        assert_eq!(
            validate_file(&zip, &config).error.as_deref(),
            Some("File type not supported: application/zip")
        );

        let ok = FileUpload::new("notes.txt", "text/plain", b"hello".to_vec());
        assert_eq!(validate_file(&ok, &config), FileValidation::ok());
    }

    #[test]
    fn size_at_limit_is_accepted() {
        let config = FilesConfig::default();
        let exact = FileUpload::new("a.png", "image/png", vec![0; config.max_file_size as usize]);
        assert!(validate_file(&exact, &config).valid);
    }

    #[test]
    fn file_sizes_format_like_the_viewer() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
    }

    #[test]
    fn mime_inference() {
        assert_eq!(mime_from_path(Path::new("x/report.PDF")), "application/pdf");
        assert_eq!(mime_from_path(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(mime_from_path(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn upload_from_path_reads_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("labs.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let upload = FileUpload::from_path(&path).await.unwrap();
        assert_eq!(upload.name, "labs.csv");
        assert_eq!(upload.mime_type, "text/csv");
        assert_eq!(upload.size(), 8);
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub sql: SqlConfig,
    pub document: DocumentConfig,
    pub backup: BackupConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

/// Embedded-SQL strategy: attempts and the fixed delay between them.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SqlConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

/// Schemaless fallback strategy.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DocumentConfig {
    pub db_name: String,
    pub version: u32,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackupConfig {
    pub interval_secs: u64,
    /// Size of the rotating snapshot history kept next to `latest`. 0 disables history.
    pub max_backups: usize,
    pub snapshot_file: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FilesConfig {
    pub max_file_size: u64,
    pub allowed_mime_types: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            storage: StorageConfig::default(),
            sql: SqlConfig::default(),
            document: DocumentConfig::default(),
            backup: BackupConfig::default(),
            files: FilesConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().into_owned(),
        }
    }
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            db_name: "MedThreadDB".into(),
            version: 2,
            max_retries: 2,
            retry_delay_ms: 500,
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            max_backups: 10,
            snapshot_file: "backup.db".into(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_mime_types: [
                "image/jpeg",
                "image/png",
                "image/gif",
                "image/webp",
                "application/pdf",
                "text/plain",
                "text/csv",
                "application/msword",
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl SqlConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl DocumentConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl BackupConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// Returns `~/.medthread/`
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".medthread")
}

/// Returns the default config file path: `~/.medthread/config.toml`
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

impl StoreConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StoreConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (MEDTHREAD_DATA_DIR, MEDTHREAD_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEDTHREAD_DATA_DIR") {
            self.storage.data_dir = val;
        }
        if let Ok(val) = std::env::var("MEDTHREAD_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Config rooted at `dir`, used by tests and embedding applications.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let mut config = StoreConfig::default();
        config.storage.data_dir = dir.as_ref().to_string_lossy().into_owned();
        config
    }

    /// Resolve the data directory, expanding `~` if needed.
    pub fn resolved_data_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.data_dir)
    }

    /// Location of the snapshot store file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.resolved_data_dir().join(&self.backup.snapshot_file)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.sql.max_retries, 3);
        assert_eq!(config.sql.retry_delay(), Duration::from_millis(1000));
        assert_eq!(config.document.db_name, "MedThreadDB");
        assert_eq!(config.document.version, 2);
        assert_eq!(config.document.max_retries, 2);
        assert_eq!(config.backup.interval(), Duration::from_secs(300));
        assert_eq!(config.backup.max_backups, 10);
        assert_eq!(config.files.max_file_size, 10 * 1024 * 1024);
        assert!(config
            .files
            .allowed_mime_types
            .contains(&"application/pdf".to_string()));
        assert!(config.storage.data_dir.ends_with(".medthread"));
    }

    #[test]
    fn parse_toml_config() {
        let toml_str = r#"
[logging]
level = "debug"

[storage]
data_dir = "/tmp/medthread"

[sql]
max_retries = 5

[backup]
interval_secs = 60
max_backups = 0
"#;
        let config: StoreConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.storage.data_dir, "/tmp/medthread");
        assert_eq!(config.sql.max_retries, 5);
        assert_eq!(config.backup.interval_secs, 60);
        assert_eq!(config.backup.max_backups, 0);
        // defaults still apply for unset fields
        assert_eq!(config.sql.retry_delay_ms, 1000);
        assert_eq!(config.document.max_retries, 2);
        assert_eq!(config.backup.snapshot_file, "backup.db");
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = StoreConfig::default();
        std::env::set_var("MEDTHREAD_DATA_DIR", "/tmp/override");
        std::env::set_var("MEDTHREAD_LOG_LEVEL", "trace");

        config.apply_env_overrides();

        assert_eq!(config.storage.data_dir, "/tmp/override");
        assert_eq!(config.logging.level, "trace");

        std::env::remove_var("MEDTHREAD_DATA_DIR");
        std::env::remove_var("MEDTHREAD_LOG_LEVEL");
    }

    #[test]
    fn in_dir_roots_snapshot_path() {
        let config = StoreConfig::in_dir("/tmp/mt");
        assert_eq!(config.snapshot_path(), PathBuf::from("/tmp/mt/backup.db"));
    }
}

//! Versioned schemaless document store.
//!
//! A single JSON file holds named collections of records keyed by `id`. Opening
//! with a higher version than the one on disk upgrades the file in place (adds
//! any missing collections); opening with a lower version is refused. Every
//! write is persisted with an atomic tmp-file + rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{StoreError, StoreResult};

/// A single stored record.
pub type Record = Map<String, JsonValue>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentFile {
    name: String,
    version: u32,
    collections: BTreeMap<String, Vec<Record>>,
}

pub struct DocumentStore {
    path: PathBuf,
    state: Mutex<DocumentFile>,
}

impl DocumentStore {
    /// Open (or create) the store at `path` with the given collections.
    pub fn open(
        path: impl AsRef<Path>,
        name: &str,
        version: u32,
        collections: &[&str],
    ) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            let file: DocumentFile = serde_json::from_str(&contents)?;
            if file.name != name {
                return Err(StoreError::Document(format!(
                    "store at {} belongs to '{}', expected '{name}'",
                    path.display(),
                    file.name
                )));
            }
            if file.version > version {
                return Err(StoreError::Document(format!(
                    "stored version {} is newer than requested version {version}",
                    file.version
                )));
            }
            file
        } else {
            DocumentFile {
                name: name.to_string(),
                version,
                collections: BTreeMap::new(),
            }
        };

        let mut changed = !path.exists() || file.version != version;
        for collection in collections {
            if !file.collections.contains_key(*collection) {
                file.collections.insert(collection.to_string(), Vec::new());
                changed = true;
            }
        }
        if file.version != version {
            tracing::info!(from = file.version, to = version, name, "upgrading document store");
            file.version = version;
        }

        let store = Self {
            path,
            state: Mutex::new(file),
        };
        if changed {
            let state = store.lock()?;
            store.persist(&state)?;
        }

        tracing::debug!(path = %store.path.display(), "document store opened");
        Ok(store)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, DocumentFile>> {
        self.state
            .lock()
            .map_err(|e| StoreError::Document(format!("store lock poisoned: {e}")))
    }

    fn persist(&self, file: &DocumentFile) -> StoreResult<()> {
        let tmp_path = self.path.with_extension("tmp");
        let json = serde_json::to_vec(file)?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> StoreResult<u32> {
        Ok(self.lock()?.version)
    }

    pub fn collection_names(&self) -> StoreResult<Vec<String>> {
        Ok(self.lock()?.collections.keys().cloned().collect())
    }

    /// Add a record. Fails if the collection is unknown or the `id` already exists.
    /// Returns the new collection length.
    pub fn add(&self, collection: &str, record: Record) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let records = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::Document(format!("unknown collection: {collection}")))?;

        if let Some(id) = record.get("id") {
            if records.iter().any(|existing| existing.get("id") == Some(id)) {
                return Err(StoreError::Document(format!(
                    "key {id} already exists in {collection}"
                )));
            }
        }

        records.push(record);
        let len = records.len();
        if let Err(e) = self.persist(&state) {
            // Memory must not run ahead of disk.
            if let Some(records) = state.collections.get_mut(collection) {
                records.pop();
            }
            return Err(e);
        }
        Ok(len)
    }

    /// Every record in insertion order.
    pub fn to_array(&self, collection: &str) -> StoreResult<Vec<Record>> {
        let state = self.lock()?;
        state
            .collections
            .get(collection)
            .cloned()
            .ok_or_else(|| StoreError::Document(format!("unknown collection: {collection}")))
    }

    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        Ok(self.to_array(collection)?.len())
    }
}

//! Short-lived references to file payloads.
//!
//! A transient URL pins a copy of a payload in memory until it is revoked.
//! Callers must revoke every URL they create; unrevoked entries live as long as
//! the owning [`Database`](crate::Database).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::StoredFile;
use crate::error::{StoreError, StoreResult};

const URL_PREFIX: &str = "blob:medthread/";

/// A payload held for a transient URL.
#[derive(Debug, Clone)]
pub struct TransientBlob {
    pub mime_type: String,
    pub data: Arc<[u8]>,
}

#[derive(Debug, Default)]
pub struct BlobUrlRegistry {
    entries: Mutex<HashMap<String, TransientBlob>>,
}

impl BlobUrlRegistry {
    /// Register the file's payload and return a `blob:medthread/<uuid>` URL.
    ///
    /// Fails if the file was loaded without its payload (e.g. from a listing).
    pub fn create(&self, file: &StoredFile) -> StoreResult<String> {
        let data = file
            .data
            .as_deref()
            .ok_or_else(|| StoreError::FileUnavailable(file.id.clone()))?;

        let url = format!("{URL_PREFIX}{}", uuid::Uuid::now_v7());
        let blob = TransientBlob {
            mime_type: file.mime_type.clone(),
            data: Arc::from(data),
        };
        self.lock().insert(url.clone(), blob);
        tracing::debug!(%url, file_id = %file.id, "transient URL created");
        Ok(url)
    }

    /// Release a URL. Returns `false` if it was unknown or already revoked.
    pub fn revoke(&self, url: &str) -> bool {
        let removed = self.lock().remove(url).is_some();
        if removed {
            tracing::debug!(%url, "transient URL revoked");
        }
        removed
    }

    pub fn resolve(&self, url: &str) -> Option<TransientBlob> {
        self.lock().get(url).cloned()
    }

    /// Number of URLs not yet revoked.
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TransientBlob>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

//! # keyway-store-file
//!
//! Durable [`CredentialStore`] backend persisting to a single JSON file.
//!
//! The whole store is one flat JSON object on disk. Writes go through a
//! temporary file in the same directory followed by a rename, so a crash
//! mid-write leaves the previous state intact. A mutex serializes writers
//! within the process; the engine's single logical thread of control is
//! assumed across processes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use keyway_client::error::AuthError;
use keyway_client::store::CredentialStore;
use keyway_client::AuthResult;

/// Credential store backed by one JSON file.
pub struct FileCredentialStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Creates a store over the given file path.
    ///
    /// The file is created lazily on the first save; a missing file reads
    /// as an empty store.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// The path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the backing file; a missing file is an empty map.
    async fn load(&self) -> AuthResult<BTreeMap<String, String>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(AuthError::storage(format!(
                    "Failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            AuthError::storage(format!(
                "Corrupt credential file {}: {e}",
                self.path.display()
            ))
        })
    }

    /// Writes the map through a temporary file and renames it into place.
    async fn persist(&self, entries: &BTreeMap<String, String>) -> AuthResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                AuthError::storage(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }

        let serialized = serde_json::to_vec_pretty(entries)
            .map_err(|e| AuthError::storage(format!("Failed to serialize credentials: {e}")))?;

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &serialized).await.map_err(|e| {
            AuthError::storage(format!("Failed to write {}: {e}", tmp_path.display()))
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            AuthError::storage(format!(
                "Failed to replace {}: {e}",
                self.path.display()
            ))
        })?;

        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        Ok(self.load().await?.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await?;
        tracing::trace!("Persisted credential key {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}

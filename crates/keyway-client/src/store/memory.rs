//! In-process credential store backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::CredentialStore;
use crate::AuthResult;

/// Ephemeral credential store backed by an in-process map.
///
/// Contents are lost when the process exits. Suitable for tests and for
/// hosts that deliberately want no credential persistence across runs.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, key: &str) -> AuthResult<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, value: &str) -> AuthResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> AuthResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryCredentialStore::new();

        assert_eq!(store.get("k").await.unwrap(), None);

        store.save("k", "v1").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v1".to_string()));

        store.save("k", "v2").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));

        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryCredentialStore::new();
        assert!(store.delete("never-written").await.is_ok());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let store = MemoryCredentialStore::new();
        store.save("a", "1").await.unwrap();
        store.save("b", "2").await.unwrap();
        store.delete("a").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some("2".to_string()));
    }
}

//! File-based token store
//!
//! Stores tokens in ~/.config/mailroom/session.json

use async_trait::async_trait;
use parking_lot::RwLock;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::Tokens;

use super::TokenStore;

/// Token store backed by a JSON file, with an in-memory cache
pub struct FileTokenStore {
    path: PathBuf,
    cache: RwLock<Option<Tokens>>,
}

impl FileTokenStore {
    /// Create a token store at the given path
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cache: RwLock::new(None),
        }
    }

    /// Location of the session file
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn write_file(&self, tokens: &Tokens) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(tokens)?;
        std::fs::write(&self.path, data)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<Tokens>> {
        if let Some(tokens) = self.cache.read().clone() {
            return Ok(Some(tokens));
        }

        if !self.path.exists() {
            debug!("No session file at {:?}", self.path);
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&self.path)?;
        let tokens: Tokens = serde_json::from_str(&contents)
            .map_err(|e| Error::TokenStore(format!("Corrupt session file: {}", e)))?;
        *self.cache.write() = Some(tokens.clone());
        Ok(Some(tokens))
    }

    async fn store(&self, tokens: &Tokens) -> Result<()> {
        self.write_file(tokens)?;
        *self.cache.write() = Some(tokens.clone());
        debug!("Stored session tokens at {:?}", self.path);
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.cache.write() = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(access: &str) -> Tokens {
        Tokens {
            access: access.to_string(),
            refresh: "refresh-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("session.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileTokenStore::new(path.clone());
        store.store(&tokens("access-1")).await.unwrap();
        store.update_access("access-2").await.unwrap();

        let reopened = FileTokenStore::new(path);
        let loaded = reopened.load().await.unwrap().unwrap();
        assert_eq!(loaded.access, "access-2");
        assert_eq!(loaded.refresh, "refresh-1");
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("session.json"));
        store.store(&tokens("a")).await.unwrap();
        store.clear().await.unwrap();
        store.clear().await.unwrap();
        assert!(store.load().await.unwrap().is_none());
        assert!(store.update_access("b").await.is_err());
    }
}

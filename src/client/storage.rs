//! Durable key-value storage for the client cache.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tokio::fs;

use crate::client::ClientError;

/// Whole-value storage keyed by name. Each `store` must be atomic: a reader
/// sees either the previous value or the new one.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<String>, ClientError>;
    async fn store(&self, key: &str, value: &str) -> Result<(), ClientError>;
    async fn remove(&self, key: &str) -> Result<(), ClientError>;
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CacheStorage for FileStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, ClientError> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn store(&self, key: &str, value: &str) -> Result<(), ClientError> {
        fs::create_dir_all(&self.dir).await?;
        let target = self.path_for(key);
        let temp = self.dir.join(format!(".{}.json.tmp", key));
        fs::write(&temp, value).await?;
        fs::rename(&temp, &target).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process storage. Clones share the same map, so a cache can be
/// "reopened" over the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ClientError> {
        self.values
            .lock()
            .map_err(|_| ClientError::Storage("memory storage lock poisoned".to_string()))
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn store(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("cache"));

        assert_eq!(storage.load("stockpro_entries").await.unwrap(), None);
        storage.store("stockpro_entries", "[1]").await.unwrap();
        storage.store("stockpro_entries", "[2]").await.unwrap();
        assert_eq!(
            storage.load("stockpro_entries").await.unwrap().as_deref(),
            Some("[2]")
        );
        assert!(!dir.path().join("cache/.stockpro_entries.json.tmp").exists());

        storage.remove("stockpro_entries").await.unwrap();
        storage.remove("stockpro_entries").await.unwrap();
        assert_eq!(storage.load("stockpro_entries").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_storage_clones_share_data() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.store("k", "v").await.unwrap();
        assert_eq!(other.load("k").await.unwrap().as_deref(), Some("v"));
    }
}

//! Persistent tier implementations

use crate::error::{PostcacheError, PostcacheResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Raw string key/value storage that survives the session.
///
/// Values are opaque strings; the cache store owns their encoding.
#[async_trait]
pub trait PersistentTier: Send + Sync {
    /// Read a value
    async fn read(&self, key: &str) -> PostcacheResult<Option<String>>;

    /// Write a value, replacing any previous one.
    ///
    /// Fails with `StorageQuota` when the tier is full.
    async fn write(&self, key: &str, value: &str) -> PostcacheResult<()>;

    /// Remove a value; removing a missing key is not an error
    async fn remove(&self, key: &str) -> PostcacheResult<()>;

    /// All stored keys
    async fn keys(&self) -> PostcacheResult<Vec<String>>;

    /// Remove every value
    async fn clear(&self) -> PostcacheResult<()>;

    /// Bytes currently used
    async fn usage(&self) -> PostcacheResult<u64>;
}

fn check_quota(
    key: &str,
    quota: Option<u64>,
    used: u64,
    replaced: u64,
    incoming: u64,
) -> PostcacheResult<()> {
    if let Some(quota) = quota {
        let base = used.saturating_sub(replaced);
        if base + incoming > quota {
            return Err(PostcacheError::storage_quota(
                key,
                incoming,
                quota.saturating_sub(base),
            ));
        }
    }
    Ok(())
}

/// In-memory persistent tier, for sessions that must not touch the disk
#[derive(Debug, Default)]
pub struct InMemoryTier {
    values: Mutex<HashMap<String, String>>,
    quota: Option<u64>,
}

impl InMemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tier that refuses writes beyond `quota` bytes
    pub fn with_quota(quota: u64) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            quota: Some(quota),
        }
    }
}

#[async_trait]
impl PersistentTier for InMemoryTier {
    async fn read(&self, key: &str) -> PostcacheResult<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, value: &str) -> PostcacheResult<()> {
        let mut values = self.values.lock();
        let used: u64 = values.values().map(|v| v.len() as u64).sum();
        let replaced = values.get(key).map_or(0, |v| v.len() as u64);
        check_quota(key, self.quota, used, replaced, value.len() as u64)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PostcacheResult<()> {
        self.values.lock().remove(key);
        Ok(())
    }

    async fn keys(&self) -> PostcacheResult<Vec<String>> {
        Ok(self.values.lock().keys().cloned().collect())
    }

    async fn clear(&self) -> PostcacheResult<()> {
        self.values.lock().clear();
        Ok(())
    }

    async fn usage(&self) -> PostcacheResult<u64> {
        Ok(self.values.lock().values().map(|v| v.len() as u64).sum())
    }
}

/// Disk-based persistent tier.
///
/// One file per key in a single directory; the key is percent-encoded into
/// the file name. An index of file sizes is kept in memory.
#[derive(Debug)]
pub struct DiskStorage {
    base_dir: PathBuf,
    quota: Option<u64>,
    index: Mutex<HashMap<String, u64>>,
}

impl DiskStorage {
    /// Open the directory (creating it if needed) and index existing files
    pub async fn open(base_dir: impl AsRef<Path>, quota: Option<u64>) -> PostcacheResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).await.map_err(|e| {
            PostcacheError::io_with_path(
                format!("Failed to create cache directory: {}", e),
                base_dir.display().to_string(),
            )
        })?;

        let storage = Self {
            base_dir,
            quota,
            index: Mutex::new(HashMap::new()),
        };
        storage.initialize_index().await?;
        Ok(storage)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get file path for a key
    fn file_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", urlencoding::encode(key)))
    }

    async fn initialize_index(&self) -> PostcacheResult<()> {
        let mut found = HashMap::new();
        let mut entries = fs::read_dir(&self.base_dir).await.map_err(|e| {
            PostcacheError::storage(format!("Failed to read cache directory: {}", e))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            PostcacheError::storage(format!("Failed to read directory entry: {}", e))
        })? {
            let file_name = entry.file_name();
            let Some(encoded) = file_name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            let Ok(key) = urlencoding::decode(encoded) else {
                continue;
            };
            let metadata = entry.metadata().await?;
            if metadata.is_file() {
                found.insert(key.into_owned(), metadata.len());
            }
        }

        debug!(
            "Indexed {} cache files in {}",
            found.len(),
            self.base_dir.display()
        );
        *self.index.lock() = found;
        Ok(())
    }
}

#[async_trait]
impl PersistentTier for DiskStorage {
    async fn read(&self, key: &str) -> PostcacheResult<Option<String>> {
        if !self.index.lock().contains_key(key) {
            return Ok(None);
        }
        match fs::read_to_string(self.file_path(key)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.index.lock().remove(key);
                Ok(None)
            }
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                // Not UTF-8; hand back something the caller will reject as corrupt
                Ok(Some(String::new()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &str, value: &str) -> PostcacheResult<()> {
        let incoming = value.len() as u64;
        {
            let index = self.index.lock();
            let used: u64 = index.values().sum();
            let replaced = index.get(key).copied().unwrap_or(0);
            check_quota(key, self.quota, used, replaced, incoming)?;
        }

        let path = self.file_path(key);
        fs::write(&path, value).await.map_err(|e| {
            PostcacheError::io_with_path(
                format!("Failed to write cache file: {}", e),
                path.display().to_string(),
            )
        })?;
        self.index.lock().insert(key.to_string(), incoming);
        Ok(())
    }

    async fn remove(&self, key: &str) -> PostcacheResult<()> {
        self.index.lock().remove(key);
        match fs::remove_file(self.file_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> PostcacheResult<Vec<String>> {
        Ok(self.index.lock().keys().cloned().collect())
    }

    async fn clear(&self) -> PostcacheResult<()> {
        for key in self.keys().await? {
            self.remove(&key).await?;
        }
        Ok(())
    }

    async fn usage(&self) -> PostcacheResult<u64> {
        Ok(self.index.lock().values().sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_tier_basic_operations() {
        let tier = InMemoryTier::new();
        tier.write("postcache_1_initial_100", "{}").await.unwrap();
        assert_eq!(
            tier.read("postcache_1_initial_100").await.unwrap().as_deref(),
            Some("{}")
        );
        assert_eq!(tier.usage().await.unwrap(), 2);

        tier.remove("postcache_1_initial_100").await.unwrap();
        assert!(tier.read("postcache_1_initial_100").await.unwrap().is_none());
        tier.remove("never-written").await.unwrap();
    }

    #[tokio::test]
    async fn test_quota_rejects_oversized_writes() {
        let tier = InMemoryTier::with_quota(10);
        tier.write("a", "12345").await.unwrap();

        let err = tier.write("b", "123456").await.unwrap_err();
        match err {
            PostcacheError::StorageQuota {
                key,
                required,
                available,
                ..
            } => {
                assert_eq!(key, "b");
                assert_eq!(required, 6);
                assert_eq!(available, 5);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        // Replacing a value only counts the difference
        tier.write("a", "1234567890").await.unwrap();
    }

    #[tokio::test]
    async fn test_disk_storage_round_trip_and_reopen() {
        let dir = TempDir::new().unwrap();
        let key = "postcache_42_a/b?c_100";
        {
            let storage = DiskStorage::open(dir.path(), None).await.unwrap();
            storage.write(key, r#"{"x":1}"#).await.unwrap();
            assert_eq!(storage.usage().await.unwrap(), 7);
        }

        let reopened = DiskStorage::open(dir.path(), None).await.unwrap();
        assert_eq!(reopened.keys().await.unwrap(), vec![key.to_string()]);
        assert_eq!(
            reopened.read(key).await.unwrap().as_deref(),
            Some(r#"{"x":1}"#)
        );

        reopened.clear().await.unwrap();
        assert!(reopened.keys().await.unwrap().is_empty());
        assert_eq!(reopened.usage().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_disk_storage_quota() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::open(dir.path(), Some(4)).await.unwrap();
        let err = storage.write("k", "12345").await.unwrap_err();
        assert!(matches!(err, PostcacheError::StorageQuota { .. }));
        assert!(storage.read("k").await.unwrap().is_none());
    }
}

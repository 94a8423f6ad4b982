use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Result, bail};

use super::KeyValueStore;

/// In-process storage, optionally bounded by a total byte capacity the way a
/// browser origin's local storage quota is.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    capacity: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Mutex::default(),
            capacity: Some(capacity),
        }
    }

    /// Total bytes held across all keys.
    pub fn used_bytes(&self) -> usize {
        self.entries().values().map(Vec::len).sum()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut entries = self.entries();
        if let Some(capacity) = self.capacity {
            let replaced = entries.get(key).map(Vec::len).unwrap_or(0);
            let used: usize = entries.values().map(Vec::len).sum();
            let needed = used - replaced + data.len();
            if needed > capacity {
                bail!("storage quota exceeded: {needed} of {capacity} bytes for key {key}");
            }
        }
        entries.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries().remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capacity_counts_replaced_value_once() {
        let storage = MemoryStorage::with_capacity(10);
        storage.put("a", &[0; 6]).await.unwrap();
        storage.put("a", &[0; 10]).await.unwrap();
        assert_eq!(storage.used_bytes(), 10);

        let err = storage.put("b", &[0; 1]).await.unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
        assert!(!storage.contains("b"));

        assert!(storage.delete("a").await.unwrap());
        storage.put("b", &[0; 4]).await.unwrap();
        assert_eq!(storage.get("b").await.unwrap(), Some(vec![0; 4]));
    }
}

//! In-memory storage backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::{StorageBackend, WriteOp};
use crate::error::StorageError;

/// Ordered in-memory backend, used in dev mode and tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut entries = self.entries.write().await;
        for op in ops {
            match op {
                WriteOp::Put(key, value) => {
                    entries.insert(key, value);
                },
                WriteOp::Delete(key) => {
                    entries.remove(&key);
                },
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_crud_roundtrip() {
        let backend = MemoryBackend::new();

        assert!(backend.get("key").await.unwrap().is_none());

        backend.put("key", b"v1").await.unwrap();
        assert_eq!(backend.get("key").await.unwrap(), Some(b"v1".to_vec()));

        backend.put("key", b"v2").await.unwrap();
        assert_eq!(backend.get("key").await.unwrap(), Some(b"v2".to_vec()));

        backend.delete("key").await.unwrap();
        assert!(!backend.exists("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_list_prefix_is_sorted() {
        let backend = MemoryBackend::new();
        backend.put("b/2", b"").await.unwrap();
        backend.put("a/1", b"").await.unwrap();
        backend.put("b/1", b"").await.unwrap();
        backend.put("bb", b"").await.unwrap();

        assert_eq!(backend.list("b/").await.unwrap(), vec!["b/1", "b/2"]);
        assert_eq!(backend.list("").await.unwrap().len(), 4);
        assert!(backend.list("c/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_batch() {
        let backend = MemoryBackend::new();
        backend.put("gone", b"x").await.unwrap();

        backend
            .write_batch(vec![
                WriteOp::Put("a".into(), b"1".to_vec()),
                WriteOp::Delete("gone".into()),
            ])
            .await
            .unwrap();

        assert_eq!(backend.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert!(backend.get("gone").await.unwrap().is_none());
        assert_eq!(backend.len().await, 1);
    }
}

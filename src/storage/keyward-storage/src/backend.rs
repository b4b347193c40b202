//! Storage backend trait definition.

use async_trait::async_trait;

use crate::error::StorageError;

/// A single write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Insert or overwrite a value.
    Put(String, Vec<u8>),
    /// Remove a value (no-op if absent).
    Delete(String),
}

/// Storage backend trait for implementing different storage engines.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get a value by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Put a value with a key.
    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a value by key.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// List keys with a prefix, in ascending lexical order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    /// Check if a key exists.
    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    /// Apply a batch of writes.
    ///
    /// Backends that support transactions override this so the batch is
    /// applied atomically.
    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        for op in ops {
            match op {
                WriteOp::Put(key, value) => self.put(&key, &value).await?,
                WriteOp::Delete(key) => self.delete(&key).await?,
            }
        }
        Ok(())
    }
}

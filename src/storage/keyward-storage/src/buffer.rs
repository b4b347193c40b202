//! Write-buffer overlay.
//!
//! A [`BufferedBackend`] sits on top of committed state for the duration of
//! one request. Reads observe the request's own writes; nothing reaches the
//! parent until [`BufferedBackend::commit`]. Dropping the buffer discards
//! every effect of the request.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::backend::{StorageBackend, WriteOp};
use crate::error::StorageError;

/// Buffered view over a parent backend.
pub struct BufferedBackend<'a> {
    parent: &'a dyn StorageBackend,
    // `None` marks a buffered delete.
    writes: Mutex<BTreeMap<String, Option<Vec<u8>>>>,
}

impl<'a> BufferedBackend<'a> {
    /// Opens a new buffer over `parent`.
    pub fn new(parent: &'a dyn StorageBackend) -> Self {
        Self {
            parent,
            writes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of keys written (or deleted) so far.
    pub async fn pending_writes(&self) -> usize {
        self.writes.lock().await.len()
    }

    /// Flushes every buffered write to the parent in a single batch.
    ///
    /// Returns the number of keys written.
    pub async fn commit(self) -> Result<usize, StorageError> {
        let writes = self.writes.into_inner();
        let count = writes.len();

        let ops = writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => WriteOp::Put(key, value),
                None => WriteOp::Delete(key),
            })
            .collect();

        self.parent.write_batch(ops).await?;
        debug!(writes = count, "Buffered unit committed");
        Ok(count)
    }

    /// Drops the buffer without touching the parent.
    pub fn discard(self) {
        drop(self);
    }
}

#[async_trait]
impl StorageBackend for BufferedBackend<'_> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        if let Some(entry) = self.writes.lock().await.get(key) {
            return Ok(entry.clone());
        }
        self.parent.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.writes
            .lock()
            .await
            .insert(key.to_string(), Some(value.to_vec()));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.writes.lock().await.insert(key.to_string(), None);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let mut keys: BTreeSet<String> = self.parent.list(prefix).await?.into_iter().collect();

        let writes = self.writes.lock().await;
        for (key, value) in writes
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match value {
                Some(_) => keys.insert(key.clone()),
                None => keys.remove(key),
            };
        }

        Ok(keys.into_iter().collect())
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let mut writes = self.writes.lock().await;
        for op in ops {
            match op {
                WriteOp::Put(key, value) => writes.insert(key, Some(value)),
                WriteOp::Delete(key) => writes.insert(key, None),
            };
        }
        Ok(())
    }
}

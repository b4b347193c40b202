//! Sequenced collections.
//!
//! A [`SeqCollection`] maps a monotonically assigned `u64` id to a
//! JSON-encoded record. Ids start at 1 and are never reused. The counter is
//! written in the same unit as the record, so a discarded unit rolls back
//! both and a failed attempt never consumes an id.
//!
//! Layout under a collection prefix `p`:
//!
//! - `p/seq` - last assigned id (big-endian `u64`)
//! - `p/r/{id:020}` - record, zero padded so lexical order is id order

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::StorageBackend;
use crate::error::StorageError;

fn encode_id_key(prefix: &str, id: u64) -> String {
    format!("{prefix}{id:020}")
}

fn decode_id_key(prefix: &str, key: &str) -> Result<u64, StorageError> {
    key.strip_prefix(prefix)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| StorageError::Serialization(format!("malformed id key: {key}")))
}

/// A monotonic `u64` counter.
#[derive(Debug, Clone)]
pub struct Sequence {
    key: String,
}

impl Sequence {
    /// Creates a sequence stored at `key`.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Returns the last value handed out (0 if none).
    pub async fn peek(&self, store: &dyn StorageBackend) -> Result<u64, StorageError> {
        match store.get(&self.key).await? {
            None => Ok(0),
            Some(bytes) => {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Serialization(format!("corrupt sequence at {}", self.key))
                })?;
                Ok(u64::from_be_bytes(raw))
            },
        }
    }

    /// Advances the counter and returns the new value.
    pub async fn next(&self, store: &dyn StorageBackend) -> Result<u64, StorageError> {
        let next = self
            .peek(store)
            .await?
            .checked_add(1)
            .ok_or_else(|| StorageError::InvalidInput(format!("sequence {} exhausted", self.key)))?;
        store.put(&self.key, &next.to_be_bytes()).await?;
        Ok(next)
    }
}

/// Append-only collection of records keyed by a sequence-assigned id.
pub struct SeqCollection<T> {
    name: &'static str,
    record_prefix: String,
    seq: Sequence,
    set_id: fn(&mut T, u64),
    _marker: PhantomData<fn() -> T>,
}

impl<T> SeqCollection<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Creates a collection under `prefix`.
    ///
    /// `set_id` writes the assigned id into the record before it is stored.
    pub fn new(name: &'static str, prefix: &str, set_id: fn(&mut T, u64)) -> Self {
        Self {
            name,
            record_prefix: format!("{prefix}/r/"),
            seq: Sequence::new(format!("{prefix}/seq")),
            set_id,
            _marker: PhantomData,
        }
    }

    /// Human readable collection name, used in error messages.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn record_key(&self, id: u64) -> String {
        encode_id_key(&self.record_prefix, id)
    }

    /// Appends a record and returns its freshly assigned id.
    pub async fn append(&self, store: &dyn StorageBackend, mut value: T) -> Result<u64, StorageError> {
        let id = self.seq.next(store).await?;
        (self.set_id)(&mut value, id);
        let bytes = serde_json::to_vec(&value)?;
        store.put(&self.record_key(id), &bytes).await?;
        Ok(id)
    }

    /// Returns the record with the given id, if any.
    pub async fn get(&self, store: &dyn StorageBackend, id: u64) -> Result<Option<T>, StorageError> {
        match store.get(&self.record_key(id)).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Overwrites an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the id was never appended.
    pub async fn set(&self, store: &dyn StorageBackend, id: u64, value: &T) -> Result<(), StorageError> {
        let key = self.record_key(id);
        if !store.exists(&key).await? {
            return Err(StorageError::NotFound(format!("{} {}", self.name, id)));
        }
        let bytes = serde_json::to_vec(value)?;
        store.put(&key, &bytes).await
    }

    /// Returns true if a record with this id exists.
    pub async fn has(&self, store: &dyn StorageBackend, id: u64) -> Result<bool, StorageError> {
        store.exists(&self.record_key(id)).await
    }

    /// Last id handed out by the collection (0 if empty).
    pub async fn last_id(&self, store: &dyn StorageBackend) -> Result<u64, StorageError> {
        self.seq.peek(store).await
    }

    /// Ids of every stored record in ascending order.
    pub async fn ids(&self, store: &dyn StorageBackend) -> Result<Vec<u64>, StorageError> {
        store
            .list(&self.record_prefix)
            .await?
            .iter()
            .map(|key| decode_id_key(&self.record_prefix, key))
            .collect()
    }

    /// Number of stored records.
    pub async fn count(&self, store: &dyn StorageBackend) -> Result<u64, StorageError> {
        Ok(store.list(&self.record_prefix).await?.len() as u64)
    }

    /// Every stored record in ascending id order.
    pub async fn iter(&self, store: &dyn StorageBackend) -> Result<Vec<(u64, T)>, StorageError> {
        let mut out = Vec::new();
        for id in self.ids(store).await? {
            if let Some(value) = self.get(store, id).await? {
                out.push((id, value));
            }
        }
        Ok(out)
    }
}

/// A set of ids stored as empty marker keys, used as a secondary index.
#[derive(Debug, Clone)]
pub struct IdSet {
    prefix: String,
}

impl IdSet {
    /// Creates an id set under `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: format!("{prefix}/"),
        }
    }

    /// Adds an id.
    pub async fn insert(&self, store: &dyn StorageBackend, id: u64) -> Result<(), StorageError> {
        store.put(&encode_id_key(&self.prefix, id), &[]).await
    }

    /// Removes an id (no-op if absent).
    pub async fn remove(&self, store: &dyn StorageBackend, id: u64) -> Result<(), StorageError> {
        store.delete(&encode_id_key(&self.prefix, id)).await
    }

    /// Returns true if the id is present.
    pub async fn contains(&self, store: &dyn StorageBackend, id: u64) -> Result<bool, StorageError> {
        store.exists(&encode_id_key(&self.prefix, id)).await
    }

    /// All ids in ascending order.
    pub async fn ids(&self, store: &dyn StorageBackend) -> Result<Vec<u64>, StorageError> {
        store
            .list(&self.prefix)
            .await?
            .iter()
            .map(|key| decode_id_key(&self.prefix, key))
            .collect()
    }
}

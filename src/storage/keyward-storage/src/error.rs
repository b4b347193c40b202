//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Entry not found.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// Connection to the backend could not be established.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// A query against the backend failed.
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Invalid input (key, namespace, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

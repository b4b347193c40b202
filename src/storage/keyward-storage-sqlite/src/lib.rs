//! # Keyward Storage - SQLite Backend
//!
//! SQLite implementation of the storage backend. Each ledger namespace gets
//! its own database file, and batched writes from a committed unit are
//! applied inside a single SQL transaction.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use keyward_storage::{StorageBackend, StorageError, WriteOp};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS state (
    key        TEXT PRIMARY KEY,
    value      BLOB NOT NULL,
    updated_at INTEGER NOT NULL
)
"#;

/// SQLite storage backend.
///
/// The database lives at `{base_path}/{namespace}.db`.
#[derive(Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteBackend {
    /// Opens or creates the database for a namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Namespace is invalid
    /// - Directory cannot be created
    /// - Database connection or migration fails
    pub async fn open(base_path: impl AsRef<Path>, namespace: &str) -> Result<Self, StorageError> {
        Self::validate_namespace(namespace)?;

        let base = base_path.as_ref();
        std::fs::create_dir_all(base).map_err(|e| {
            StorageError::ConnectionFailed(format!("failed to create directory: {e}"))
        })?;

        let db_path = base.join(format!("{namespace}.db"));
        let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

        debug!(namespace = %namespace, path = %db_path.display(), "Opening SQLite database");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        sqlx::query(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| StorageError::ConnectionFailed(format!("migration failed: {e}")))?;

        info!(namespace = %namespace, "SQLite backend ready");

        Ok(Self { pool, db_path })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Validates that a namespace is safe to use as a file name.
    ///
    /// Only allows: lowercase letters, digits, underscore, hyphen.
    fn validate_namespace(namespace: &str) -> Result<(), StorageError> {
        if namespace.is_empty() {
            return Err(StorageError::InvalidInput("namespace cannot be empty".into()));
        }

        if namespace.len() > 64 {
            return Err(StorageError::InvalidInput("namespace too long".into()));
        }

        let valid = namespace
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        if !valid {
            return Err(StorageError::InvalidInput(
                "namespace must match [a-z0-9_-]+".into(),
            ));
        }

        Ok(())
    }

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default()
    }
}

// LIKE treats `%` and `_` as wildcards; the prefix is matched with a range
// scan instead so any key text is safe.
fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        if let Some(next) = char::from_u32(last as u32 + 1) {
            chars.push(next);
            return Some(chars.into_iter().collect());
        }
    }
    None
}

#[async_trait]
impl StorageBackend for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM state WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(row.map(|(v,)| v))
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO state (key, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Self::now())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rows: Vec<(String,)> = match prefix_upper_bound(prefix) {
            Some(upper) => {
                sqlx::query_as("SELECT key FROM state WHERE key >= ? AND key < ? ORDER BY key")
                    .bind(prefix)
                    .bind(upper)
                    .fetch_all(&self.pool)
                    .await
            },
            None => {
                sqlx::query_as("SELECT key FROM state WHERE key >= ? ORDER BY key")
                    .bind(prefix)
                    .fetch_all(&self.pool)
                    .await
            },
        }
        .map_err(|e| StorageError::QueryFailed(e.to_string()))?;

        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<(), StorageError> {
        let now = Self::now();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        for op in &ops {
            let result = match op {
                WriteOp::Put(key, value) => {
                    sqlx::query(
                        r#"
                        INSERT INTO state (key, value, updated_at)
                        VALUES (?, ?, ?)
                        ON CONFLICT(key) DO UPDATE SET
                            value = excluded.value,
                            updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(key.as_str())
                    .bind(value.as_slice())
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                },
                WriteOp::Delete(key) => {
                    sqlx::query("DELETE FROM state WHERE key = ?")
                        .bind(key.as_str())
                        .execute(&mut *tx)
                        .await
                },
            };
            result.map_err(|e| StorageError::Transaction(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Transaction(e.to_string()))?;

        debug!(ops = ops.len(), "Batch committed");
        Ok(())
    }
}

//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in the local store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value failed to parse.
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

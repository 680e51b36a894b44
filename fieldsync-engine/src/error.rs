//! Error types for the sync engine.

use fieldsync_types::EntityKind;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error (transport unavailable).
    #[error("network error: {0}")]
    Network(String),

    /// Authentication error (transport unavailable).
    #[error("authentication error: {0}")]
    Auth(String),

    /// Remote snapshot failed to parse or validate.
    #[error("malformed remote data: {0}")]
    MalformedRemoteData(String),

    /// A field the policy table forbids was about to leave the device.
    /// This is a programming error: the snapshot filter must run first.
    #[error("policy violation: field '{field}' of {kind} is not sync-eligible")]
    PolicyViolation { kind: EntityKind, field: String },

    /// The sync queue capacity cap was exceeded.
    #[error("sync queue overflow: capacity {capacity} reached")]
    QueueOverflow { capacity: usize },

    /// Local storage error.
    #[error("storage error: {0}")]
    Storage(#[from] fieldsync_store::StorageError),

    /// Field encryption error.
    #[error("crypto error: {0}")]
    Crypto(#[from] fieldsync_crypto::CryptoError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl SyncError {
    /// True for errors a later sync pass can retry; everything else
    /// indicates a local bug or corrupted state.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_)
                | SyncError::Auth(_)
                | SyncError::MalformedRemoteData(_)
                | SyncError::Timeout
        )
    }
}

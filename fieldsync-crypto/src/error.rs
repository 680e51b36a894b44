//! Error types for the crypto layer.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur while sealing or opening field values.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption failed (wrong key, tampered data, or malformed input).
    #[error("decryption error: {0}")]
    Decryption(String),

    /// Key material was the wrong size.
    #[error("invalid key: expected {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },
}

//! Key material for field encryption.

use crate::error::{CryptoError, CryptoResult};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a field key in bytes (ChaCha20-Poly1305).
pub const KEY_SIZE: usize = 32;

/// A 32-byte symmetric key for sealing field values.
///
/// Key derivation and storage are the caller's concern; this type only
/// guarantees the material is zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldKey([u8; KEY_SIZE]);

impl FieldKey {
    /// Generates a fresh random key.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wraps existing key material.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey {
                expected: KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Returns the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FieldKey(..)")
    }
}

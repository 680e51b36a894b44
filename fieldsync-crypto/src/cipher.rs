//! Field value encryption using ChaCha20-Poly1305.
//!
//! Provides authenticated encryption; a tampered ciphertext fails to
//! open rather than producing garbage plaintext.

use crate::error::{CryptoError, CryptoResult};
use crate::key::FieldKey;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// An encrypted field value with the metadata needed to open it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedValue {
    /// The nonce used for encryption (unique per encryption).
    pub nonce: [u8; NONCE_SIZE],
    /// The ciphertext (includes the auth tag).
    pub ciphertext: Vec<u8>,
}

impl EncryptedValue {
    /// Returns the total encoded size.
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    /// Returns true if the ciphertext is empty.
    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Encodes to base64 so the value fits a flat JSON snapshot.
    pub fn to_base64(&self) -> String {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let mut bytes = Vec::with_capacity(self.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        STANDARD.encode(&bytes)
    }

    /// Decodes from base64.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        use base64::{engine::general_purpose::STANDARD, Engine};
        let bytes = STANDARD
            .decode(encoded)
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption("data too short".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        let ciphertext = bytes[NONCE_SIZE..].to_vec();

        Ok(Self { nonce, ciphertext })
    }
}

/// Encrypts a plaintext field value.
pub fn encrypt(key: &FieldKey, plaintext: &[u8]) -> CryptoResult<EncryptedValue> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedValue {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts an encrypted field value.
pub fn decrypt(key: &FieldKey, encrypted: &EncryptedValue) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&encrypted.nonce);

    cipher
        .decrypt(nonce, encrypted.ciphertext.as_ref())
        .map_err(|_| {
            CryptoError::Decryption("decryption failed (wrong key or tampered data)".to_string())
        })
}

/// Encrypts a string field and returns the base64-armored result.
pub fn encrypt_string(key: &FieldKey, plaintext: &str) -> CryptoResult<String> {
    let encrypted = encrypt(key, plaintext.as_bytes())?;
    Ok(encrypted.to_base64())
}

/// Decrypts a base64-armored string field.
pub fn decrypt_string(key: &FieldKey, encoded: &str) -> CryptoResult<String> {
    let encrypted = EncryptedValue::from_base64(encoded)?;
    let plaintext = decrypt(key, &encrypted)?;
    String::from_utf8(plaintext)
        .map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
}

//! Authenticated field encryption for FieldSync.
//!
//! Fields whose policy says `encrypted: true` are sealed with
//! ChaCha20-Poly1305 before they leave the device. The ciphertext is
//! base64-armored so it fits in the flat JSON snapshot format like any
//! other string value.

mod cipher;
mod error;
mod key;

pub use cipher::{decrypt, decrypt_string, encrypt, encrypt_string, EncryptedValue, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::FieldKey;

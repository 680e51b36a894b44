//! The snapshot filter — applies the policy table to records.
//!
//! `split` produces the sync-eligible projection of a record and its
//! complement (the locally-retained fields). Sealing and opening of
//! `encrypted: true` fields happens at the transit boundary only; the
//! merge engine never sees the cipher.

use crate::error::SyncResult;
use crate::policy::PolicyTable;
use fieldsync_crypto::FieldKey;
use fieldsync_types::{EntityKind, SyncableRecord};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Swappable encryption seam for fields marked `encrypted: true`.
///
/// Implementations must be authenticated: opening a tampered value
/// must fail, not produce garbage.
pub trait FieldCipher: Send + Sync {
    /// Seals a plaintext field value for transit.
    fn seal(&self, plaintext: &str) -> SyncResult<String>;

    /// Opens a sealed field value pulled from a remote store.
    fn open(&self, sealed: &str) -> SyncResult<String>;
}

/// ChaCha20-Poly1305 cipher over a caller-provided key.
pub struct AeadFieldCipher {
    key: FieldKey,
}

impl AeadFieldCipher {
    /// Wraps a field key.
    #[must_use]
    pub fn new(key: FieldKey) -> Self {
        Self { key }
    }
}

impl FieldCipher for AeadFieldCipher {
    fn seal(&self, plaintext: &str) -> SyncResult<String> {
        Ok(fieldsync_crypto::encrypt_string(&self.key, plaintext)?)
    }

    fn open(&self, sealed: &str) -> SyncResult<String> {
        Ok(fieldsync_crypto::decrypt_string(&self.key, sealed)?)
    }
}

/// The two halves of a projected record.
#[derive(Debug, Clone)]
pub struct Projection {
    /// The record restricted to sync-eligible fields.
    pub syncable: SyncableRecord,
    /// The complement: fields the policy table keeps on this device.
    pub local_only: BTreeMap<String, Value>,
}

/// Applies the policy table to produce sync-eligible projections.
pub struct SnapshotFilter {
    policy: Arc<PolicyTable>,
    cipher: Option<Arc<dyn FieldCipher>>,
}

impl SnapshotFilter {
    /// Creates a filter without an encryption seam. Fields marked
    /// `encrypted: true` are then retained locally (fail closed).
    #[must_use]
    pub fn new(policy: Arc<PolicyTable>) -> Self {
        Self {
            policy,
            cipher: None,
        }
    }

    /// Creates a filter with an encryption seam for sealed fields.
    #[must_use]
    pub fn with_cipher(policy: Arc<PolicyTable>, cipher: Arc<dyn FieldCipher>) -> Self {
        Self {
            policy,
            cipher: Some(cipher),
        }
    }

    /// Returns the policy table this filter applies.
    #[must_use]
    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    /// Splits a record into its sync-eligible projection and the
    /// locally-retained complement. Total, deterministic, and never
    /// mutates the input. Fields absent from the policy table always
    /// land in the complement.
    #[must_use]
    pub fn split(&self, kind: EntityKind, record: &SyncableRecord) -> Projection {
        let mut syncable = SyncableRecord {
            id: record.id.clone(),
            updated_at: record.updated_at,
            fields: BTreeMap::new(),
        };
        let mut local_only = BTreeMap::new();

        for (name, value) in &record.fields {
            if self.policy.classify(kind, name).sync {
                syncable.fields.insert(name.clone(), value.clone());
            } else {
                local_only.insert(name.clone(), value.clone());
            }
        }

        Projection {
            syncable,
            local_only,
        }
    }

    /// Re-attaches locally-retained fields to a reconciled record.
    #[must_use]
    pub fn reattach(
        &self,
        mut record: SyncableRecord,
        local_only: BTreeMap<String, Value>,
    ) -> SyncableRecord {
        for (name, value) in local_only {
            record.fields.insert(name, value);
        }
        record
    }

    /// Produces the transit form of a record: sync-eligible fields
    /// only, with `encrypted: true` fields sealed.
    ///
    /// If no cipher is configured, fields that require encryption are
    /// dropped from the snapshot rather than sent in the clear.
    pub fn seal_for_transit(
        &self,
        kind: EntityKind,
        record: &SyncableRecord,
    ) -> SyncResult<SyncableRecord> {
        let mut out = self.split(kind, record).syncable;

        let sealed_names: Vec<String> = out
            .fields
            .keys()
            .filter(|name| self.policy.requires_encryption(kind, name))
            .cloned()
            .collect();

        for name in sealed_names {
            let Some(cipher) = &self.cipher else {
                warn!(
                    "no cipher configured; dropping encrypted field '{}' of {} from snapshot",
                    name, kind
                );
                out.fields.remove(&name);
                continue;
            };
            let value = out.fields.remove(&name).unwrap_or(Value::Null);
            // Seal the JSON form so non-string values round-trip exactly.
            let plaintext = serde_json::to_string(&value)?;
            out.fields.insert(name, Value::String(cipher.seal(&plaintext)?));
        }

        Ok(out)
    }

    /// Opens sealed fields of a record pulled from a remote store.
    ///
    /// A field that fails to open (wrong key, tampered, or a value
    /// that was never sealed) is dropped rather than merged as
    /// ciphertext garbage.
    #[must_use]
    pub fn open_from_transit(&self, kind: EntityKind, record: &SyncableRecord) -> SyncableRecord {
        let mut out = record.clone();

        let sealed_names: Vec<String> = out
            .fields
            .keys()
            .filter(|name| self.policy.requires_encryption(kind, name))
            .cloned()
            .collect();

        for name in sealed_names {
            let Some(cipher) = &self.cipher else {
                out.fields.remove(&name);
                continue;
            };
            let opened = out
                .fields
                .get(&name)
                .and_then(Value::as_str)
                .map(|sealed| cipher.open(sealed));
            match opened {
                Some(Ok(plaintext)) => match serde_json::from_str(&plaintext) {
                    Ok(value) => {
                        out.fields.insert(name, value);
                    }
                    Err(e) => {
                        warn!("sealed field '{}' of {} opened to invalid JSON: {e}", name, kind);
                        out.fields.remove(&name);
                    }
                },
                Some(Err(e)) => {
                    warn!("failed to open sealed field '{}' of {}: {e}", name, kind);
                    out.fields.remove(&name);
                }
                None => {
                    out.fields.remove(&name);
                }
            }
        }

        out
    }
}

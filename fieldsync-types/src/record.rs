//! Syncable records.
//!
//! A record is an identity-bearing flat mapping from field name to
//! JSON-compatible value. The `id` field is assigned at creation and
//! never reassigned; `updatedAt` is reassigned on every local mutation
//! and drives last-write-wins merging.

use crate::timestamp::UpdatedAt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// An identity-bearing record belonging to one entity kind.
///
/// Serializes to the flat JSON mapping exchanged with remote stores:
/// `id` and `updatedAt` inline alongside the domain fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncableRecord {
    /// Stable identity, assigned at creation.
    pub id: String,
    /// Recency marker. Absent on records from stores that predate
    /// sync; merge treats a missing stamp as "local wins".
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<UpdatedAt>,
    /// Domain fields. Never contains the reserved `id`/`updatedAt` keys.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl SyncableRecord {
    /// Creates an empty record with a fresh recency stamp.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            updated_at: Some(UpdatedAt::now()),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field assignment (does not advance the stamp).
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert_raw(name.into(), value.into());
        self
    }

    /// Builder-style stamp override (for tests and replay).
    #[must_use]
    pub fn with_updated_at(mut self, stamp: UpdatedAt) -> Self {
        self.updated_at = Some(stamp);
        self
    }

    /// Returns a field value, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Sets a field and advances the recency stamp.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.insert_raw(name.into(), value.into());
        self.touch();
    }

    /// Removes a field and advances the recency stamp.
    /// Returns the removed value, if any.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.fields.remove(name);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Advances the recency stamp without changing any field.
    pub fn touch(&mut self) {
        self.updated_at = Some(match self.updated_at {
            Some(stamp) => stamp.tick(),
            None => UpdatedAt::now(),
        });
    }

    /// Iterates over field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    fn insert_raw(&mut self, name: String, value: Value) {
        // Reserved keys live in the struct, not the field map; a
        // duplicate here would produce conflicting keys on serialize.
        match name.as_str() {
            "id" => {
                if let Value::String(s) = value {
                    self.id = s;
                }
            }
            "updatedAt" => {
                if let Ok(stamp) = serde_json::from_value::<UpdatedAt>(value) {
                    self.updated_at = Some(stamp);
                }
            }
            _ => {
                self.fields.insert(name, value);
            }
        }
    }
}

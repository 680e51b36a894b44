//! Snapshots — the unit exchanged with remote stores.
//!
//! A snapshot is a point-in-time, policy-filtered export of one entity
//! kind's full collection. On the wire it is a flat JSON array of
//! records; the snapshot's own timestamp and originating device are
//! carried in-band through the reserved `__syncTimestamp` and
//! `__syncDeviceId` fields of each record.

use crate::error::{SyncError, SyncResult};
use crate::filter::SnapshotFilter;
use fieldsync_types::{DeviceId, EntityKind, SyncableRecord, UpdatedAt};
use serde_json::Value;
use tracing::warn;

/// Reserved in-band field carrying the snapshot timestamp (wall millis).
pub const SYNC_TIMESTAMP_FIELD: &str = "__syncTimestamp";

/// Reserved in-band field carrying the originating device id.
pub const SYNC_DEVICE_FIELD: &str = "__syncDeviceId";

/// A policy-filtered export of one entity kind's collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    pub entity_kind: EntityKind,
    pub device_id: DeviceId,
    pub timestamp: UpdatedAt,
    pub records: Vec<SyncableRecord>,
}

impl SyncSnapshot {
    /// Builds a snapshot from a local collection, projecting every
    /// record through the snapshot filter and sealing encrypted
    /// fields.
    ///
    /// The result is guaranteed policy-clean: in debug builds a
    /// leaked non-syncable field panics; in release it is dropped
    /// with a warning (fail closed, never fail open).
    pub fn build(
        kind: EntityKind,
        device_id: DeviceId,
        records: &[SyncableRecord],
        filter: &SnapshotFilter,
    ) -> SyncResult<Self> {
        let mut projected = Vec::with_capacity(records.len());
        for record in records {
            let mut sealed = filter.seal_for_transit(kind, record)?;

            // Belt-and-braces policy check on the finished record.
            let leaked: Vec<String> = sealed
                .fields
                .keys()
                .filter(|name| !filter.policy().classify(kind, name).sync)
                .cloned()
                .collect();
            for field in leaked {
                debug_assert!(
                    false,
                    "{}",
                    SyncError::PolicyViolation {
                        kind,
                        field: field.clone()
                    }
                );
                warn!("dropping non-syncable field '{}' of {} from snapshot", field, kind);
                sealed.fields.remove(&field);
            }

            projected.push(sealed);
        }

        Ok(Self {
            entity_kind: kind,
            device_id,
            timestamp: UpdatedAt::now(),
            records: projected,
        })
    }

    /// Serializes to the wire form: a JSON array of flat records with
    /// the reserved provenance fields injected into each element.
    pub fn to_wire(&self) -> SyncResult<Value> {
        let mut elements = Vec::with_capacity(self.records.len());
        for record in &self.records {
            let mut value = serde_json::to_value(record)?;
            if let Value::Object(map) = &mut value {
                map.insert(
                    SYNC_TIMESTAMP_FIELD.to_string(),
                    Value::from(self.timestamp.wall_ms()),
                );
                map.insert(
                    SYNC_DEVICE_FIELD.to_string(),
                    Value::String(self.device_id.to_string()),
                );
            }
            elements.push(value);
        }
        Ok(Value::Array(elements))
    }

    /// Parses the wire form defensively.
    ///
    /// Returns `MalformedRemoteData` when the payload is not an array
    /// of objects; individual records that fail to parse are skipped
    /// with a warning rather than failing the whole pull.
    pub fn from_wire(kind: EntityKind, wire: &Value) -> SyncResult<Self> {
        let Value::Array(elements) = wire else {
            return Err(SyncError::MalformedRemoteData(format!(
                "{kind} snapshot is not a JSON array"
            )));
        };

        let mut device_id = DeviceId::new();
        let mut timestamp = UpdatedAt::new(0, 0);
        let mut records = Vec::with_capacity(elements.len());

        for element in elements {
            let Value::Object(map) = element else {
                warn!("skipping non-object element in {kind} snapshot");
                continue;
            };

            let mut map = map.clone();
            if let Some(ms) = map.remove(SYNC_TIMESTAMP_FIELD).and_then(|v| v.as_u64()) {
                timestamp = timestamp.max(UpdatedAt::new(ms, 0));
            }
            if let Some(id) = map
                .remove(SYNC_DEVICE_FIELD)
                .and_then(|v| v.as_str().and_then(|s| DeviceId::parse(s).ok()))
            {
                device_id = id;
            }

            match serde_json::from_value::<SyncableRecord>(Value::Object(map)) {
                Ok(record) => records.push(record),
                Err(e) => warn!("skipping unparseable record in {kind} snapshot: {e}"),
            }
        }

        Ok(Self {
            entity_kind: kind,
            device_id,
            timestamp,
            records,
        })
    }
}

//! Core type definitions for FieldSync.
//!
//! These types are shared by every layer of the sync engine:
//!
//! - [`EntityKind`]: the closed set of record categories that can sync
//! - [`SyncableRecord`]: an identity-bearing, flat field mapping
//! - [`UpdatedAt`]: the recency stamp used for last-write-wins merging
//! - [`DeviceId`] / [`DeviceRecord`]: per-installation provenance
//! - [`OperationId`]: time-ordered ids for queued sync operations

mod device;
mod ids;
mod kind;
mod record;
mod timestamp;

pub use device::DeviceRecord;
pub use ids::{DeviceId, OperationId};
pub use kind::{EntityKind, UnknownEntityKind};
pub use record::SyncableRecord;
pub use timestamp::UpdatedAt;

//! Device identity.

use crate::ids::DeviceId;
use serde::{Deserialize, Serialize};

/// The persisted identity of this device/installation.
///
/// Created once on first run and never regenerated short of a full
/// reinstall. Carried as provenance metadata on snapshots only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Stable, collision-resistant identifier for this installation.
    #[serde(rename = "deviceId")]
    pub device_id: DeviceId,
}

impl DeviceRecord {
    /// Generates a fresh device record.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            device_id: DeviceId::new(),
        }
    }
}

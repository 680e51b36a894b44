//! The closed set of syncable record categories.
//!
//! Every policy and transport operation is parameterized by
//! [`EntityKind`]. Keeping this a closed enum (rather than free-form
//! strings) means an unlisted kind is a compile error, not a silent
//! runtime fallback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A named category of syncable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Customer,
    Job,
    Worker,
    Material,
    Invoice,
}

impl EntityKind {
    /// All kinds, in the order collections are synced.
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Customer,
        EntityKind::Job,
        EntityKind::Worker,
        EntityKind::Material,
        EntityKind::Invoice,
    ];

    /// The singular wire/storage name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customer",
            EntityKind::Job => "job",
            EntityKind::Worker => "worker",
            EntityKind::Material => "material",
            EntityKind::Invoice => "invoice",
        }
    }

    /// The pluralized name used as the body key in HTTP snapshots and
    /// as the per-kind file name on the cloud drive.
    #[must_use]
    pub const fn plural(&self) -> &'static str {
        match self {
            EntityKind::Customer => "customers",
            EntityKind::Job => "jobs",
            EntityKind::Worker => "workers",
            EntityKind::Material => "materials",
            EntityKind::Invoice => "invoices",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unrecognized entity kind name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown entity kind: {0}")]
pub struct UnknownEntityKind(pub String);

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" | "customers" => Ok(EntityKind::Customer),
            "job" | "jobs" => Ok(EntityKind::Job),
            "worker" | "workers" => Ok(EntityKind::Worker),
            "material" | "materials" => Ok(EntityKind::Material),
            "invoice" | "invoices" => Ok(EntityKind::Invoice),
            other => Err(UnknownEntityKind(other.to_string())),
        }
    }
}

//! Cloud-drive transport realization.
//!
//! Stores one JSON snapshot file per entity kind inside a dedicated
//! app folder on the user's consumer cloud drive.

mod drive;

pub use drive::{DriveConfig, DriveTransport};

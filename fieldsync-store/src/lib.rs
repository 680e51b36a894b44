//! Local persisted state for FieldSync.
//!
//! Everything the device must remember across restarts lives here:
//!
//! - [`CollectionStore`]: one record collection per entity kind, the
//!   device record, and last-successful-sync timestamps
//! - [`QueueStore`]: the durable, ordered queue of pending sync
//!   operations
//!
//! Both stores serialize access through a single connection lock so
//! UI-driven writes and scheduler-driven merges never interleave.

mod collection_store;
mod error;
mod queue_store;

pub use collection_store::CollectionStore;
pub use error::{StorageError, StorageResult};
pub use queue_store::{OperationType, QueueStore, StoredOperation};

//! Offline-first sync engine for FieldSync.
//!
//! Keeps a small crew's field-operations records (customers, jobs,
//! workers, materials, invoices) consistent across devices that are
//! offline most of the day. Every device works against its own local
//! store; a scheduler reconciles with a shared remote snapshot store
//! whenever connectivity allows.
//!
//! # Architecture
//!
//! - **Policy**: a static table declares, per entity kind and field,
//!   whether data may leave the device and whether it must be sealed
//! - **Filter**: projects records to their sync-eligible subset and
//!   re-attaches the locally-retained complement after merge
//! - **Merge**: last-write-wins reconciliation by recency stamp,
//!   idempotent, union of identities
//! - **Transport**: abstracts the remote snapshot store (Google
//!   Drive folder or bearer-token HTTP endpoint)
//! - **Queue**: durable list of pending local mutations with a retry
//!   ceiling
//! - **Scheduler**: runs prioritized strategies on reconnect, on an
//!   adaptive timer, and on demand; at most one pass at a time
//!
//! # Example
//!
//! ```no_run
//! use fieldsync_engine::{
//!     create_scheduler, field_ops_policy, SnapshotFilter, SyncConfig, SyncQueue,
//! };
//! use fieldsync_engine::transport::mock::{MockRemote, MockTransport};
//! use fieldsync_store::{CollectionStore, QueueStore};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = CollectionStore::open_in_memory()?;
//! let queue = SyncQueue::new(QueueStore::open_in_memory()?, 4, None);
//! let filter = Arc::new(SnapshotFilter::new(Arc::new(field_ops_policy())));
//! let transport = Arc::new(MockTransport::new(MockRemote::new()));
//! let device = store.device_record()?;
//!
//! let (handle, _events, commands, scheduler) = create_scheduler(
//!     SyncConfig::default(),
//!     device.device_id,
//!     store,
//!     queue,
//!     filter,
//!     transport,
//! );
//! # let _ = (handle, commands, scheduler);
//! # Ok(())
//! # }
//! ```

pub mod cloud;
mod config;
mod error;
mod filter;
mod http;
mod merge;
mod policy;
mod queue;
mod scheduler;
mod snapshot;
pub mod transport;

pub use cloud::{DriveConfig, DriveTransport};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use filter::{AeadFieldCipher, FieldCipher, Projection, SnapshotFilter};
pub use http::{HttpConfig, HttpTransport};
pub use merge::merge;
pub use policy::{field_ops_policy, FieldPolicy, PolicyTable, PolicyTableBuilder, FAIL_CLOSED};
pub use queue::{OpPriority, QueueStatus, SyncQueue};
pub use scheduler::{
    built_in_strategies, create_scheduler, create_scheduler_with_strategies, Connectivity,
    NetworkQuality, SchedulerCommand, SchedulerEvent, SchedulerHandle, StrategyOutcome,
    SyncContext, SyncScheduler, SyncStrategy,
};
pub use snapshot::{SyncSnapshot, SYNC_DEVICE_FIELD, SYNC_TIMESTAMP_FIELD};
pub use transport::SnapshotTransport;

//! Transport layer abstraction.
//!
//! Defines the trait remote stores implement (cloud drive, HTTP
//! endpoint, etc.) allowing the scheduler to work with any backend.
//! Transports move whole per-kind snapshots; they never interpret
//! record contents beyond the wire framing.

use crate::error::SyncResult;
use crate::snapshot::SyncSnapshot;
use async_trait::async_trait;
use fieldsync_types::EntityKind;

/// A remote store that holds one latest snapshot per entity kind.
///
/// `push` replaces the remote snapshot for the kind; `pull` fetches
/// the latest one, or `None` when the remote has never seen the kind.
/// Implementations map remote-format problems to
/// `SyncError::MalformedRemoteData` and connectivity problems to
/// `SyncError::Network`, so the scheduler can tell them apart.
#[async_trait]
pub trait SnapshotTransport: Send + Sync {
    /// A short human-readable name for logs ("drive", "http", ...).
    fn name(&self) -> &str;

    /// Uploads a snapshot, replacing the remote copy for its kind.
    async fn push(&self, snapshot: &SyncSnapshot) -> SyncResult<()>;

    /// Downloads the latest remote snapshot for a kind.
    async fn pull(&self, kind: EntityKind) -> SyncResult<Option<SyncSnapshot>>;
}

/// A mock transport for testing.
pub mod mock {
    use super::*;
    use crate::error::SyncError;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// In-memory remote store shared between mock transports, standing
    /// in for the cloud file or HTTP endpoint two devices both talk to.
    #[derive(Debug, Default)]
    pub struct MockRemote {
        snapshots: Mutex<HashMap<EntityKind, Value>>,
    }

    impl MockRemote {
        /// Creates an empty shared remote.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Raw wire payload currently stored for a kind.
        pub fn stored(&self, kind: EntityKind) -> Option<Value> {
            self.snapshots.lock().unwrap().get(&kind).cloned()
        }

        /// Overwrites the stored payload for a kind, bypassing the
        /// transport (to simulate another device or corrupt data).
        pub fn store_raw(&self, kind: EntityKind, wire: Value) {
            self.snapshots.lock().unwrap().insert(kind, wire);
        }
    }

    /// A mock transport backed by a shared [`MockRemote`].
    pub struct MockTransport {
        remote: Arc<MockRemote>,
        fail_pushes: AtomicUsize,
        push_count: AtomicUsize,
        pull_count: AtomicUsize,
        latency: Mutex<Duration>,
    }

    impl MockTransport {
        /// Creates a transport over a shared remote.
        pub fn new(remote: Arc<MockRemote>) -> Self {
            Self {
                remote,
                fail_pushes: AtomicUsize::new(0),
                push_count: AtomicUsize::new(0),
                pull_count: AtomicUsize::new(0),
                latency: Mutex::new(Duration::ZERO),
            }
        }

        /// Makes the next `n` pushes fail with a network error.
        pub fn fail_next_pushes(&self, n: usize) {
            self.fail_pushes.store(n, Ordering::SeqCst);
        }

        /// Adds artificial latency to every push and pull.
        pub fn set_latency(&self, latency: Duration) {
            *self.latency.lock().unwrap() = latency;
        }

        /// Number of pushes attempted so far.
        pub fn pushes(&self) -> usize {
            self.push_count.load(Ordering::SeqCst)
        }

        /// Number of pulls attempted so far.
        pub fn pulls(&self) -> usize {
            self.pull_count.load(Ordering::SeqCst)
        }

        async fn simulate_latency(&self) {
            let latency = *self.latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
        }
    }

    #[async_trait]
    impl SnapshotTransport for MockTransport {
        fn name(&self) -> &str {
            "mock"
        }

        async fn push(&self, snapshot: &SyncSnapshot) -> SyncResult<()> {
            self.push_count.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;

            let remaining = self.fail_pushes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_pushes.store(remaining - 1, Ordering::SeqCst);
                return Err(SyncError::Network("simulated push failure".into()));
            }

            let wire = snapshot.to_wire()?;
            self.remote
                .snapshots
                .lock()
                .unwrap()
                .insert(snapshot.entity_kind, wire);
            Ok(())
        }

        async fn pull(&self, kind: EntityKind) -> SyncResult<Option<SyncSnapshot>> {
            self.pull_count.fetch_add(1, Ordering::SeqCst);
            self.simulate_latency().await;

            let stored = self.remote.snapshots.lock().unwrap().get(&kind).cloned();
            match stored {
                Some(wire) => Ok(Some(SyncSnapshot::from_wire(kind, &wire)?)),
                None => Ok(None),
            }
        }
    }
}

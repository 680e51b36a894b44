//! Sync scheduler — decides when a sync pass runs.
//!
//! The scheduler is the "brain" that ties together:
//! - Connectivity transitions (reconnect triggers an immediate pass)
//! - A periodic timer whose interval adapts to network quality
//! - On-demand triggers from the UI
//!
//! A pass evaluates the registered strategies, sorts the applicable
//! ones by priority, and executes them sequentially. At most one pass
//! runs at a time; a trigger arriving mid-pass is dropped, not queued.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::filter::SnapshotFilter;
use crate::merge::merge;
use crate::queue::{OpPriority, QueueStatus, SyncQueue};
use crate::snapshot::SyncSnapshot;
use crate::transport::SnapshotTransport;
use async_trait::async_trait;
use fieldsync_store::{CollectionStore, StoredOperation};
use fieldsync_types::{DeviceId, EntityKind, SyncableRecord};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// ── Connectivity ──

/// Coarse network-quality bucket from the connectivity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkQuality {
    Slow,
    Medium,
    Fast,
}

/// Connectivity state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Offline,
    Online(NetworkQuality),
}

impl Connectivity {
    /// Whether any network is available.
    #[must_use]
    pub fn is_online(&self) -> bool {
        matches!(self, Connectivity::Online(_))
    }
}

// ── Strategies ──

/// What a strategy accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StrategyOutcome {
    /// Records in the pushed snapshot(s).
    pub pushed: usize,
    /// Records received from the remote before merging.
    pub pulled: usize,
    /// Queued operations confirmed delivered.
    pub delivered: usize,
}

impl StrategyOutcome {
    fn absorb(&mut self, other: StrategyOutcome) {
        self.pushed += other.pushed;
        self.pulled += other.pulled;
        self.delivered += other.delivered;
    }
}

/// A named, orderable unit of scheduling logic.
///
/// Strategies of equal priority run in registration order. A failing
/// strategy is logged and does not block the ones after it.
#[async_trait]
pub trait SyncStrategy: Send + Sync {
    /// Name shown in logs and events.
    fn name(&self) -> &'static str;

    /// Execution priority within a pass.
    fn priority(&self) -> OpPriority;

    /// Whether this strategy has work to do right now.
    fn applies(&self, ctx: &SyncContext) -> SyncResult<bool>;

    /// Performs the strategy's sync work.
    async fn execute(&self, ctx: &SyncContext) -> SyncResult<StrategyOutcome>;
}

// ── Pass context ──

/// Shared state a pass works against. One instance per scheduler,
/// handed to every strategy.
pub struct SyncContext {
    device_id: DeviceId,
    store: CollectionStore,
    queue: SyncQueue,
    filter: Arc<SnapshotFilter>,
    transport: Arc<dyn SnapshotTransport>,
    offline: AtomicBool,
}

impl SyncContext {
    /// Creates a pass context.
    pub fn new(
        device_id: DeviceId,
        store: CollectionStore,
        queue: SyncQueue,
        filter: Arc<SnapshotFilter>,
        transport: Arc<dyn SnapshotTransport>,
    ) -> Self {
        Self {
            device_id,
            store,
            queue,
            filter,
            transport,
            offline: AtomicBool::new(true),
        }
    }

    /// The durable operation queue.
    #[must_use]
    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    /// The local collection store.
    #[must_use]
    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    /// True once a connectivity-loss event arrived. A pass checks this
    /// between strategies and stops issuing network calls.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Runs a full pull/merge/push cycle for one entity kind.
    ///
    /// Malformed remote data is treated as an absent remote (logged,
    /// never fatal to the merge). A transport failure marks the kind's
    /// pending operations failed and propagates; on success every
    /// pending operation of the kind is confirmed delivered, ceiling
    /// hits included, since the push transmitted their records. The
    /// kind's last-sync stamp then advances.
    pub async fn sync_kind(&self, kind: EntityKind) -> SyncResult<StrategyOutcome> {
        let ops: Vec<StoredOperation> = self
            .queue
            .pending_ops(None)?
            .into_iter()
            .filter(|op| op.kind == kind)
            .collect();

        let local = self.store.load_collection(kind)?;

        let remote = match self.transport.pull(kind).await {
            Ok(Some(snapshot)) => {
                debug!(
                    "pulled {} {} records from {}",
                    snapshot.records.len(),
                    kind,
                    self.transport.name()
                );
                snapshot
                    .records
                    .iter()
                    .map(|record| self.filter.open_from_transit(kind, record))
                    .collect()
            }
            Ok(None) => Vec::new(),
            Err(SyncError::MalformedRemoteData(e)) => {
                warn!("malformed remote {} data, treating as absent: {}", kind, e);
                Vec::new()
            }
            Err(e) => {
                self.record_failure(&ops, &e)?;
                return Err(e);
            }
        };

        // A record with a pending local delete must not resurrect
        // through the remote copy mid-pass.
        let tombstones = self.queue.pending_deletes(kind)?;
        let remote: Vec<SyncableRecord> = remote
            .into_iter()
            .filter(|record| !tombstones.contains(&record.id))
            .collect();
        let pulled = remote.len();

        let reconciled = merge(kind, &local, &remote, &self.filter);
        self.store.replace_collection(kind, &reconciled)?;

        let snapshot = SyncSnapshot::build(kind, self.device_id, &reconciled, &self.filter)?;
        if let Err(e) = self.transport.push(&snapshot).await {
            self.record_failure(&ops, &e)?;
            return Err(e);
        }

        for op in &ops {
            self.queue.mark_delivered(op.id)?;
        }
        self.store.set_last_sync(kind, snapshot.timestamp)?;

        Ok(StrategyOutcome {
            pushed: snapshot.records.len(),
            pulled,
            delivered: ops.len(),
        })
    }

    fn record_failure(&self, ops: &[StoredOperation], error: &SyncError) -> SyncResult<()> {
        for op in ops {
            self.queue.mark_failed(op.id, &error.to_string())?;
        }
        Ok(())
    }
}

// ── Built-in strategies ──

/// Syncs every kind that has a pending critical operation.
pub struct CriticalFieldDataStrategy;

#[async_trait]
impl SyncStrategy for CriticalFieldDataStrategy {
    fn name(&self) -> &'static str {
        "critical-field-data"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::Critical
    }

    fn applies(&self, ctx: &SyncContext) -> SyncResult<bool> {
        Ok(!ctx.queue.pending_ops(Some(OpPriority::Critical))?.is_empty())
    }

    async fn execute(&self, ctx: &SyncContext) -> SyncResult<StrategyOutcome> {
        let kinds: BTreeSet<EntityKind> = ctx
            .queue
            .pending_ops(Some(OpPriority::Critical))?
            .into_iter()
            .map(|op| op.kind)
            .collect();

        let mut outcome = StrategyOutcome::default();
        for kind in kinds {
            outcome.absorb(ctx.sync_kind(kind).await?);
        }
        Ok(outcome)
    }
}

/// Syncs job data when job operations are pending.
pub struct ActiveJobStrategy;

#[async_trait]
impl SyncStrategy for ActiveJobStrategy {
    fn name(&self) -> &'static str {
        "active-job-data"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::Important
    }

    fn applies(&self, ctx: &SyncContext) -> SyncResult<bool> {
        let ops = ctx.queue.pending_ops(None)?;
        Ok(ops.iter().any(|op| op.kind == EntityKind::Job))
    }

    async fn execute(&self, ctx: &SyncContext) -> SyncResult<StrategyOutcome> {
        ctx.sync_kind(EntityKind::Job).await
    }
}

/// Syncs material movements when material operations are pending.
pub struct MaterialUpdateStrategy;

#[async_trait]
impl SyncStrategy for MaterialUpdateStrategy {
    fn name(&self) -> &'static str {
        "material-updates"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::Important
    }

    fn applies(&self, ctx: &SyncContext) -> SyncResult<bool> {
        let ops = ctx.queue.pending_ops(None)?;
        Ok(ops.iter().any(|op| op.kind == EntityKind::Material))
    }

    async fn execute(&self, ctx: &SyncContext) -> SyncResult<StrategyOutcome> {
        ctx.sync_kind(EntityKind::Material).await
    }
}

/// Syncs the kinds carrying pending photo references.
pub struct PendingPhotoStrategy;

#[async_trait]
impl SyncStrategy for PendingPhotoStrategy {
    fn name(&self) -> &'static str {
        "pending-photos"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::Normal
    }

    fn applies(&self, ctx: &SyncContext) -> SyncResult<bool> {
        let ops = ctx.queue.pending_ops(None)?;
        Ok(ops.iter().any(|op| op.payload.get("photo").is_some()))
    }

    async fn execute(&self, ctx: &SyncContext) -> SyncResult<StrategyOutcome> {
        let kinds: BTreeSet<EntityKind> = ctx
            .queue
            .pending_ops(None)?
            .into_iter()
            .filter(|op| op.payload.get("photo").is_some())
            .map(|op| op.kind)
            .collect();

        let mut outcome = StrategyOutcome::default();
        for kind in kinds {
            outcome.absorb(ctx.sync_kind(kind).await?);
        }
        Ok(outcome)
    }
}

/// Catch-all: full collection sync of every kind, whenever online.
pub struct GeneralSyncStrategy;

#[async_trait]
impl SyncStrategy for GeneralSyncStrategy {
    fn name(&self) -> &'static str {
        "general"
    }

    fn priority(&self) -> OpPriority {
        OpPriority::Normal
    }

    fn applies(&self, _ctx: &SyncContext) -> SyncResult<bool> {
        Ok(true)
    }

    async fn execute(&self, ctx: &SyncContext) -> SyncResult<StrategyOutcome> {
        let mut outcome = StrategyOutcome::default();
        for kind in EntityKind::ALL {
            if ctx.is_offline() {
                warn!("connectivity lost, stopping general sync at {}", kind);
                break;
            }
            outcome.absorb(ctx.sync_kind(kind).await?);
        }
        Ok(outcome)
    }
}

/// The default strategy set, in registration order.
#[must_use]
pub fn built_in_strategies() -> Vec<Box<dyn SyncStrategy>> {
    vec![
        Box::new(CriticalFieldDataStrategy),
        Box::new(ActiveJobStrategy),
        Box::new(MaterialUpdateStrategy),
        Box::new(PendingPhotoStrategy),
        Box::new(GeneralSyncStrategy),
    ]
}

// ── Scheduler ──

/// Commands that can be sent to the scheduler.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Trigger a sync pass now.
    SyncNow,
    /// Report a connectivity transition or quality change.
    Connectivity(Connectivity),
    /// Stop the scheduler.
    Shutdown,
}

/// Events emitted by the scheduler for the UI.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// The device came online.
    Connected { quality: NetworkQuality },
    /// The device went offline.
    Disconnected,
    /// A pass started.
    PassStarted { reason: &'static str },
    /// A trigger arrived while a pass was in flight and was dropped.
    PassSkipped { reason: &'static str },
    /// A pass finished.
    PassCompleted {
        executed: usize,
        failed: usize,
        status: QueueStatus,
    },
    /// One strategy inside a pass failed.
    StrategyFailed { name: &'static str, error: String },
}

/// Handle to send commands to the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Triggers an on-demand sync pass.
    pub async fn sync_now(&self) -> SyncResult<()> {
        self.command_tx
            .send(SchedulerCommand::SyncNow)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }

    /// Reports a connectivity transition.
    pub async fn set_connectivity(&self, connectivity: Connectivity) -> SyncResult<()> {
        self.command_tx
            .send(SchedulerCommand::Connectivity(connectivity))
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }

    /// Shuts down the scheduler.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.command_tx
            .send(SchedulerCommand::Shutdown)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// The sync scheduler.
pub struct SyncScheduler {
    config: SyncConfig,
    ctx: Arc<SyncContext>,
    strategies: Arc<Vec<Box<dyn SyncStrategy>>>,
    event_tx: mpsc::Sender<SchedulerEvent>,
    connectivity: Connectivity,
    in_flight: Arc<AtomicBool>,
}

impl SyncScheduler {
    /// Runs the scheduler event loop until `Shutdown`.
    pub async fn run(mut self, mut command_rx: mpsc::Receiver<SchedulerCommand>) -> SyncResult<()> {
        // Offline until the connectivity layer says otherwise; the
        // interval is rebuilt on every quality change.
        let mut interval = tokio::time::interval(self.config.interval_for(NetworkQuality::Medium));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "scheduler started for device {} ({} strategies)",
            self.ctx.device_id,
            self.strategies.len()
        );

        loop {
            tokio::select! {
                Some(cmd) = command_rx.recv() => {
                    debug!("scheduler command: {:?}", cmd);
                    match cmd {
                        SchedulerCommand::Shutdown => {
                            info!("scheduler shutting down");
                            break;
                        }
                        SchedulerCommand::SyncNow => {
                            self.trigger_pass("manual").await;
                        }
                        SchedulerCommand::Connectivity(next) => {
                            let was_online = self.connectivity.is_online();
                            self.connectivity = next;
                            match next {
                                Connectivity::Offline => {
                                    self.ctx.set_offline(true);
                                    if was_online {
                                        info!("connectivity lost");
                                        self.emit(SchedulerEvent::Disconnected).await;
                                    }
                                }
                                Connectivity::Online(quality) => {
                                    self.ctx.set_offline(false);
                                    interval = tokio::time::interval(
                                        self.config.interval_for(quality),
                                    );
                                    interval.set_missed_tick_behavior(
                                        tokio::time::MissedTickBehavior::Skip,
                                    );
                                    // The fresh interval ticks immediately;
                                    // consume that tick so the reconnect pass
                                    // is the only immediate one.
                                    interval.reset();
                                    if !was_online {
                                        info!("connectivity restored ({:?})", quality);
                                        self.emit(SchedulerEvent::Connected { quality }).await;
                                        self.trigger_pass("reconnect").await;
                                    }
                                }
                            }
                        }
                    }
                }

                _ = interval.tick() => {
                    if self.connectivity.is_online() {
                        self.trigger_pass("interval").await;
                    }
                }
            }
        }

        Ok(())
    }

    /// Starts a pass unless one is already in flight; an overlapping
    /// trigger is dropped so passes never stack.
    async fn trigger_pass(&self, reason: &'static str) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("pass already in flight, dropping {} trigger", reason);
            self.emit(SchedulerEvent::PassSkipped { reason }).await;
            return;
        }

        self.emit(SchedulerEvent::PassStarted { reason }).await;

        let ctx = self.ctx.clone();
        let strategies = self.strategies.clone();
        let event_tx = self.event_tx.clone();
        let in_flight = self.in_flight.clone();

        tokio::spawn(async move {
            let (executed, failed) = run_pass(&ctx, &strategies, &event_tx).await;
            let status = ctx.queue.status().unwrap_or_default();
            let _ = event_tx
                .send(SchedulerEvent::PassCompleted {
                    executed,
                    failed,
                    status,
                })
                .await;
            in_flight.store(false, Ordering::SeqCst);
        });
    }

    async fn emit(&self, event: SchedulerEvent) {
        let _ = self.event_tx.send(event).await;
    }
}

/// Executes one pass: applicable strategies, priority order, each
/// independently. Returns (executed, failed) counts.
async fn run_pass(
    ctx: &SyncContext,
    strategies: &[Box<dyn SyncStrategy>],
    event_tx: &mpsc::Sender<SchedulerEvent>,
) -> (usize, usize) {
    let mut applicable: Vec<&dyn SyncStrategy> = Vec::new();
    for strategy in strategies {
        match strategy.applies(ctx) {
            Ok(true) => applicable.push(strategy.as_ref()),
            Ok(false) => {}
            Err(e) => warn!("strategy {} condition failed: {}", strategy.name(), e),
        }
    }
    // Stable sort keeps registration order within a priority.
    applicable.sort_by_key(|s| s.priority());

    let mut executed = 0usize;
    let mut failed = 0usize;

    for strategy in applicable {
        if ctx.is_offline() {
            warn!("connectivity lost, aborting remaining strategies");
            break;
        }

        match strategy.execute(ctx).await {
            Ok(outcome) => {
                executed += 1;
                debug!(
                    "strategy {} done: pushed={} pulled={} delivered={}",
                    strategy.name(),
                    outcome.pushed,
                    outcome.pulled,
                    outcome.delivered
                );
            }
            Err(e) => {
                failed += 1;
                warn!("strategy {} failed: {}", strategy.name(), e);
                let _ = event_tx
                    .send(SchedulerEvent::StrategyFailed {
                        name: strategy.name(),
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    }

    (executed, failed)
}

/// Creates a scheduler with the built-in strategies and returns the
/// pieces needed to run it.
pub fn create_scheduler(
    config: SyncConfig,
    device_id: DeviceId,
    store: CollectionStore,
    queue: SyncQueue,
    filter: Arc<SnapshotFilter>,
    transport: Arc<dyn SnapshotTransport>,
) -> (
    SchedulerHandle,
    mpsc::Receiver<SchedulerEvent>,
    mpsc::Receiver<SchedulerCommand>,
    SyncScheduler,
) {
    create_scheduler_with_strategies(
        config,
        device_id,
        store,
        queue,
        filter,
        transport,
        built_in_strategies(),
    )
}

/// Creates a scheduler with a custom strategy set.
pub fn create_scheduler_with_strategies(
    config: SyncConfig,
    device_id: DeviceId,
    store: CollectionStore,
    queue: SyncQueue,
    filter: Arc<SnapshotFilter>,
    transport: Arc<dyn SnapshotTransport>,
    strategies: Vec<Box<dyn SyncStrategy>>,
) -> (
    SchedulerHandle,
    mpsc::Receiver<SchedulerEvent>,
    mpsc::Receiver<SchedulerCommand>,
    SyncScheduler,
) {
    let (command_tx, command_rx) = mpsc::channel(32);
    let (event_tx, event_rx) = mpsc::channel(64);

    let handle = SchedulerHandle { command_tx };

    let scheduler = SyncScheduler {
        config,
        ctx: Arc::new(SyncContext::new(device_id, store, queue, filter, transport)),
        strategies: Arc::new(strategies),
        event_tx,
        connectivity: Connectivity::Offline,
        in_flight: Arc::new(AtomicBool::new(false)),
    };

    (handle, event_rx, command_rx, scheduler)
}

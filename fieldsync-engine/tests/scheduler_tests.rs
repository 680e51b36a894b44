//! End-to-end pass behavior against the in-memory mock transport.

use fieldsync_engine::transport::mock::{MockRemote, MockTransport};
use fieldsync_engine::{
    create_scheduler, field_ops_policy, Connectivity, NetworkQuality, SchedulerEvent,
    SnapshotFilter, SyncConfig, SyncContext, SyncError, SyncQueue,
};
use fieldsync_store::{CollectionStore, OperationType, QueueStore};
use fieldsync_types::{EntityKind, SyncableRecord, UpdatedAt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

const RETRY_CEILING: u32 = 4;

struct Device {
    store: CollectionStore,
    queue: SyncQueue,
    ctx: SyncContext,
    transport: Arc<MockTransport>,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn device(remote: &Arc<MockRemote>) -> Device {
    init_tracing();
    let store = CollectionStore::open_in_memory().unwrap();
    let queue = SyncQueue::new(QueueStore::open_in_memory().unwrap(), RETRY_CEILING, None);
    let filter = Arc::new(SnapshotFilter::new(Arc::new(field_ops_policy())));
    let transport = Arc::new(MockTransport::new(remote.clone()));
    let device_id = store.device_record().unwrap().device_id;

    let ctx = SyncContext::new(
        device_id,
        store.clone(),
        queue.clone(),
        filter,
        transport.clone(),
    );

    Device {
        store,
        queue,
        ctx,
        transport,
    }
}

fn customer(id: &str, name: &str, stamp: UpdatedAt) -> SyncableRecord {
    SyncableRecord::new(id)
        .with_field("name", json!(name))
        .with_field("phone", json!("555-0100"))
        .with_updated_at(stamp)
}

async fn next_event(rx: &mut mpsc::Receiver<SchedulerEvent>) -> SchedulerEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for scheduler event")
        .expect("event channel closed")
}

#[tokio::test]
async fn two_devices_converge_and_keep_local_only_fields() {
    let remote = MockRemote::new();
    let alpha = device(&remote);
    let beta = device(&remote);

    // Device alpha knows the customer including the local-only ssn.
    let original = customer("c1", "Acme", UpdatedAt::new(1_000, 0))
        .with_field("ssn", json!("123-45-6789"));
    alpha
        .store
        .upsert_record(EntityKind::Customer, &original)
        .unwrap();

    alpha.ctx.sync_kind(EntityKind::Customer).await.unwrap();
    beta.ctx.sync_kind(EntityKind::Customer).await.unwrap();

    // Beta received the customer without the ssn.
    let beta_copy = beta
        .store
        .get_record(EntityKind::Customer, "c1")
        .unwrap()
        .unwrap();
    assert_eq!(beta_copy.get("name"), Some(&json!("Acme")));
    assert!(beta_copy.get("ssn").is_none());

    // Beta renames with a later stamp and syncs it back.
    let renamed = customer("c1", "Acme Paving LLC", UpdatedAt::new(2_000, 0));
    beta.store
        .upsert_record(EntityKind::Customer, &renamed)
        .unwrap();
    beta.ctx.sync_kind(EntityKind::Customer).await.unwrap();
    alpha.ctx.sync_kind(EntityKind::Customer).await.unwrap();

    // Alpha sees the rename but keeps its own ssn.
    let alpha_copy = alpha
        .store
        .get_record(EntityKind::Customer, "c1")
        .unwrap()
        .unwrap();
    assert_eq!(alpha_copy.get("name"), Some(&json!("Acme Paving LLC")));
    assert_eq!(alpha_copy.get("ssn"), Some(&json!("123-45-6789")));

    // The shared remote never saw the ssn either.
    let stored = remote.stored(EntityKind::Customer).unwrap().to_string();
    assert!(!stored.contains("123-45-6789"));
}

#[tokio::test]
async fn sync_kind_delivers_queued_ops_and_stamps_last_sync() {
    let remote = MockRemote::new();
    let dev = device(&remote);

    dev.store
        .upsert_record(
            EntityKind::Job,
            &SyncableRecord::new("j1").with_field("title", json!("Patio")),
        )
        .unwrap();
    dev.queue
        .enqueue(
            EntityKind::Job,
            OperationType::Create,
            Some("j1".into()),
            json!({"title": "Patio"}),
        )
        .unwrap();

    assert!(dev.store.last_sync(EntityKind::Job).unwrap().is_none());

    let outcome = dev.ctx.sync_kind(EntityKind::Job).await.unwrap();
    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.pushed, 1);

    assert!(dev.queue.is_empty().unwrap());
    assert!(dev.store.last_sync(EntityKind::Job).unwrap().is_some());
}

#[tokio::test]
async fn pending_delete_does_not_resurrect_from_remote() {
    let remote = MockRemote::new();
    let alpha = device(&remote);
    let beta = device(&remote);

    // Both records reach the remote via alpha.
    for id in ["c1", "c2"] {
        alpha
            .store
            .upsert_record(
                EntityKind::Customer,
                &customer(id, "x", UpdatedAt::new(1_000, 0)),
            )
            .unwrap();
    }
    alpha.ctx.sync_kind(EntityKind::Customer).await.unwrap();
    beta.ctx.sync_kind(EntityKind::Customer).await.unwrap();

    // Beta deletes c2 locally and queues the delete.
    assert!(beta.store.delete_record(EntityKind::Customer, "c2").unwrap());
    beta.queue
        .enqueue(
            EntityKind::Customer,
            OperationType::Delete,
            Some("c2".into()),
            json!({}),
        )
        .unwrap();

    beta.ctx.sync_kind(EntityKind::Customer).await.unwrap();

    // c2 stays gone locally and is gone from the remote copy too.
    assert!(beta
        .store
        .get_record(EntityKind::Customer, "c2")
        .unwrap()
        .is_none());
    let stored = remote.stored(EntityKind::Customer).unwrap();
    assert!(!stored.to_string().contains("c2"));
    assert!(beta.queue.is_empty().unwrap());
}

#[tokio::test]
async fn malformed_remote_is_treated_as_absent() {
    let remote = MockRemote::new();
    let dev = device(&remote);

    remote.store_raw(EntityKind::Customer, json!({"not": "an array"}));
    dev.store
        .upsert_record(
            EntityKind::Customer,
            &customer("c1", "Acme", UpdatedAt::new(1_000, 0)),
        )
        .unwrap();

    let outcome = dev.ctx.sync_kind(EntityKind::Customer).await.unwrap();
    assert_eq!(outcome.pulled, 0);
    assert_eq!(outcome.pushed, 1);

    // The push replaced the garbage with a valid snapshot.
    let stored = remote.stored(EntityKind::Customer).unwrap();
    assert!(stored.is_array());
}

#[tokio::test]
async fn push_failure_marks_ops_failed_until_the_ceiling() {
    let remote = MockRemote::new();
    let dev = device(&remote);

    let stuck = dev
        .queue
        .enqueue(
            EntityKind::Customer,
            OperationType::Update,
            Some("c1".into()),
            json!({"name": "Acme"}),
        )
        .unwrap();
    dev.queue
        .enqueue(
            EntityKind::Job,
            OperationType::Update,
            Some("j1".into()),
            json!({"status": "active"}),
        )
        .unwrap();
    dev.queue
        .enqueue(
            EntityKind::Job,
            OperationType::Update,
            Some("j2".into()),
            json!({"status": "done"}),
        )
        .unwrap();

    dev.transport.fail_next_pushes(5);
    for _ in 0..5 {
        let err = dev.ctx.sync_kind(EntityKind::Customer).await.unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }

    // The stuck op surfaced as failed but is still queued; the job
    // ops were never touched and stay retryable.
    let status = dev.queue.status().unwrap();
    assert_eq!(status.pending, 3);
    assert_eq!(status.failed, 1);

    let retryable = dev.queue.retryable_ops().unwrap();
    assert_eq!(retryable.len(), 2);
    assert!(retryable.iter().all(|op| op.id != stuck));
    assert!(retryable.iter().all(|op| op.kind == EntityKind::Job));
}

#[tokio::test]
async fn recovered_push_retires_ceiling_hit_ops() {
    let remote = MockRemote::new();
    let dev = device(&remote);

    dev.queue
        .enqueue(
            EntityKind::Customer,
            OperationType::Update,
            Some("c1".into()),
            json!({"name": "Acme"}),
        )
        .unwrap();

    dev.transport.fail_next_pushes(RETRY_CEILING as usize);
    for _ in 0..RETRY_CEILING {
        dev.ctx.sync_kind(EntityKind::Customer).await.unwrap_err();
    }
    assert_eq!(dev.queue.status().unwrap().failed, 1);

    // The transport recovers; the next successful pass pushed the
    // op's record with the collection, so the op is retired too.
    let outcome = dev.ctx.sync_kind(EntityKind::Customer).await.unwrap();
    assert_eq!(outcome.delivered, 1);

    let status = dev.queue.status().unwrap();
    assert_eq!(status.pending, 0);
    assert_eq!(status.failed, 0);
    assert!(dev.queue.is_empty().unwrap());
}

#[tokio::test]
async fn manual_retry_resets_a_ceiling_hit_op() {
    let remote = MockRemote::new();
    let dev = device(&remote);

    let id = dev
        .queue
        .enqueue(
            EntityKind::Invoice,
            OperationType::Update,
            Some("i1".into()),
            json!({"status": "sent"}),
        )
        .unwrap();
    for _ in 0..RETRY_CEILING {
        dev.queue.mark_failed(id, "offline").unwrap();
    }
    assert!(dev.queue.retryable_ops().unwrap().is_empty());

    assert_eq!(dev.queue.retry_failed().unwrap(), 1);
    assert_eq!(dev.queue.status().unwrap().failed, 0);
    assert_eq!(dev.queue.retryable_ops().unwrap().len(), 1);
}

#[tokio::test]
async fn reconnect_triggers_a_pass_and_overlapping_triggers_are_dropped() {
    let remote = MockRemote::new();
    let dev = device(&remote);
    let transport = dev.transport.clone();
    let filter = Arc::new(SnapshotFilter::new(Arc::new(field_ops_policy())));

    let (handle, mut events, commands, scheduler) = create_scheduler(
        SyncConfig::default(),
        dev.store.device_record().unwrap().device_id,
        dev.store.clone(),
        dev.queue.clone(),
        filter,
        transport.clone(),
    );
    let runner = tokio::spawn(scheduler.run(commands));

    handle
        .set_connectivity(Connectivity::Online(NetworkQuality::Fast))
        .await
        .unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::Connected { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::PassStarted { reason: "reconnect" }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::PassCompleted { failed: 0, .. }
    ));

    // Slow the transport down so the next pass stays in flight while
    // a second trigger arrives.
    transport.set_latency(Duration::from_millis(200));
    handle.sync_now().await.unwrap();
    handle.sync_now().await.unwrap();

    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::PassStarted { reason: "manual" }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::PassSkipped { reason: "manual" }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::PassCompleted { .. }
    ));

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn going_offline_emits_disconnected_and_stops_interval_passes() {
    let remote = MockRemote::new();
    let dev = device(&remote);
    let filter = Arc::new(SnapshotFilter::new(Arc::new(field_ops_policy())));

    let (handle, mut events, commands, scheduler) = create_scheduler(
        SyncConfig::default(),
        dev.store.device_record().unwrap().device_id,
        dev.store.clone(),
        dev.queue.clone(),
        filter,
        dev.transport.clone(),
    );
    let runner = tokio::spawn(scheduler.run(commands));

    handle
        .set_connectivity(Connectivity::Online(NetworkQuality::Medium))
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::Connected { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::PassStarted { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::PassCompleted { .. }
    ));

    handle.set_connectivity(Connectivity::Offline).await.unwrap();
    assert!(matches!(
        next_event(&mut events).await,
        SchedulerEvent::Disconnected
    ));

    // No further passes while offline.
    let quiet = timeout(Duration::from_millis(300), events.recv()).await;
    assert!(quiet.is_err());

    handle.shutdown().await.unwrap();
    runner.await.unwrap().unwrap();
}

#[test]
fn interval_adapts_to_network_quality() {
    let config = SyncConfig::default();
    assert!(config.interval_for(NetworkQuality::Slow) > config.interval_for(NetworkQuality::Medium));
    assert!(config.interval_for(NetworkQuality::Medium) > config.interval_for(NetworkQuality::Fast));
}

use fieldsync_store::{OperationType, QueueStore, StoredOperation};
use fieldsync_types::{EntityKind, OperationId, UpdatedAt};
use serde_json::json;

fn op(kind: EntityKind, op_type: OperationType, entity_id: Option<&str>) -> StoredOperation {
    StoredOperation {
        id: OperationId::new(),
        kind,
        op: op_type,
        entity_id: entity_id.map(String::from),
        payload: json!({"note": "test"}),
        enqueued_at: UpdatedAt::now(),
        attempts: 0,
        last_error: None,
    }
}

#[test]
fn starts_empty() {
    let store = QueueStore::open_in_memory().unwrap();
    assert!(store.is_empty().unwrap());
    assert!(store.pending_ops().unwrap().is_empty());
}

#[test]
fn pending_ops_preserve_enqueue_order() {
    let store = QueueStore::open_in_memory().unwrap();
    let first = op(EntityKind::Customer, OperationType::Create, None);
    let second = op(EntityKind::Job, OperationType::Update, Some("j1"));
    let third = op(EntityKind::Material, OperationType::Delete, Some("m1"));

    store.enqueue(&first).unwrap();
    store.enqueue(&second).unwrap();
    store.enqueue(&third).unwrap();

    let pending = store.pending_ops().unwrap();
    assert_eq!(pending.len(), 3);
    assert_eq!(pending[0].id, first.id);
    assert_eq!(pending[1].id, second.id);
    assert_eq!(pending[2].id, third.id);
}

#[test]
fn mark_delivered_removes_operation() {
    let store = QueueStore::open_in_memory().unwrap();
    let queued = op(EntityKind::Worker, OperationType::Create, None);
    store.enqueue(&queued).unwrap();

    assert!(store.mark_delivered(queued.id).unwrap());
    assert!(store.is_empty().unwrap());
    // Second delivery of the same op is a no-op.
    assert!(!store.mark_delivered(queued.id).unwrap());
}

#[test]
fn mark_failed_increments_attempts_and_keeps_op() {
    let store = QueueStore::open_in_memory().unwrap();
    let queued = op(EntityKind::Invoice, OperationType::Update, Some("i1"));
    store.enqueue(&queued).unwrap();

    assert_eq!(store.mark_failed(queued.id, "connection refused").unwrap(), 1);
    assert_eq!(store.mark_failed(queued.id, "timeout").unwrap(), 2);

    let pending = store.pending_ops().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].attempts, 2);
    assert_eq!(pending[0].last_error.as_deref(), Some("timeout"));
}

#[test]
fn reset_attempts_clears_failure_state() {
    let store = QueueStore::open_in_memory().unwrap();
    let queued = op(EntityKind::Customer, OperationType::Update, Some("c1"));
    store.enqueue(&queued).unwrap();
    store.mark_failed(queued.id, "timeout").unwrap();
    store.mark_failed(queued.id, "timeout").unwrap();

    assert!(store.reset_attempts(queued.id).unwrap());

    let pending = store.pending_ops().unwrap();
    assert_eq!(pending[0].attempts, 0);
    assert!(pending[0].last_error.is_none());
    // Unknown id is a no-op.
    assert!(!store.reset_attempts(OperationId::new()).unwrap());
}

#[test]
fn queue_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queue.db");
    let queued = op(EntityKind::Job, OperationType::Create, None);

    {
        let store = QueueStore::open(&path).unwrap();
        store.enqueue(&queued).unwrap();
        store.mark_failed(queued.id, "offline").unwrap();
    }

    let store = QueueStore::open(&path).unwrap();
    let pending = store.pending_ops().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, queued.id);
    assert_eq!(pending[0].attempts, 1);
    assert_eq!(pending[0].payload, json!({"note": "test"}));
}

//! The sync queue — pending local mutations awaiting transmission.
//!
//! A thin facade over the durable [`QueueStore`] that adds the bits
//! the scheduler cares about: priority classification, the retry
//! ceiling, the optional capacity cap, and the pending/failed status
//! summary surfaced to the UI.

use crate::error::{SyncError, SyncResult};
use fieldsync_store::{OperationType, QueueStore, StoredOperation};
use fieldsync_types::{EntityKind, OperationId, UpdatedAt};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Delivery priority of a queued operation, derived from its entity
/// kind and payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OpPriority {
    /// Operations flagged critical in their payload, synced first.
    Critical,
    /// Active-job and material movements.
    Important,
    /// Everything else.
    Normal,
}

impl OpPriority {
    /// Classifies a stored operation.
    ///
    /// A payload carrying `"critical": true` is critical regardless
    /// of kind; job and material operations are important; the rest,
    /// photo uploads included, is normal. Photos ride the dedicated
    /// pending-photo strategy and rank below job and material data.
    #[must_use]
    pub fn classify(op: &StoredOperation) -> Self {
        let flagged = op
            .payload
            .get("critical")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if flagged {
            return OpPriority::Critical;
        }

        match op.kind {
            EntityKind::Job | EntityKind::Material => OpPriority::Important,
            _ => OpPriority::Normal,
        }
    }
}

/// Pending/failed counts for the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStatus {
    /// Operations still awaiting delivery, including failed ones.
    pub pending: usize,
    /// Operations at or past the retry ceiling, awaiting manual retry.
    pub failed: usize,
}

/// Ordered, durable queue of sync operations.
#[derive(Clone)]
pub struct SyncQueue {
    store: QueueStore,
    retry_ceiling: u32,
    capacity: Option<usize>,
}

impl SyncQueue {
    /// Wraps a queue store with delivery policy.
    #[must_use]
    pub fn new(store: QueueStore, retry_ceiling: u32, capacity: Option<usize>) -> Self {
        Self {
            store,
            retry_ceiling,
            capacity,
        }
    }

    /// Appends an operation for a local mutation.
    pub fn enqueue(
        &self,
        kind: EntityKind,
        op: OperationType,
        entity_id: Option<String>,
        payload: Value,
    ) -> SyncResult<OperationId> {
        if let Some(capacity) = self.capacity {
            if self.store.len()? >= capacity {
                return Err(SyncError::QueueOverflow { capacity });
            }
        }

        let operation = StoredOperation {
            id: OperationId::new(),
            kind,
            op,
            entity_id,
            payload,
            enqueued_at: UpdatedAt::now(),
            attempts: 0,
            last_error: None,
        };
        self.store.enqueue(&operation)?;
        Ok(operation.id)
    }

    /// Queued operations in enqueue order, optionally restricted to
    /// one priority bucket.
    pub fn pending_ops(&self, priority: Option<OpPriority>) -> SyncResult<Vec<StoredOperation>> {
        let mut ops = self.store.pending_ops()?;
        if let Some(wanted) = priority {
            ops.retain(|op| OpPriority::classify(op) == wanted);
        }
        Ok(ops)
    }

    /// Queued operations that have not yet hit the retry ceiling.
    pub fn retryable_ops(&self) -> SyncResult<Vec<StoredOperation>> {
        let mut ops = self.store.pending_ops()?;
        ops.retain(|op| op.attempts < self.retry_ceiling);
        Ok(ops)
    }

    /// Ids of records with a pending delete, per kind. The scheduler
    /// removes these from pulled remote data before merging, so a
    /// deleted record does not resurrect mid-pass.
    pub fn pending_deletes(&self, kind: EntityKind) -> SyncResult<BTreeSet<String>> {
        let ops = self.store.pending_ops()?;
        Ok(ops
            .into_iter()
            .filter(|op| op.kind == kind && op.op == OperationType::Delete)
            .filter_map(|op| op.entity_id)
            .collect())
    }

    /// Removes a confirmed-delivered operation.
    pub fn mark_delivered(&self, id: OperationId) -> SyncResult<()> {
        if !self.store.mark_delivered(id)? {
            debug!("delivered op {} was not queued", id);
        }
        Ok(())
    }

    /// Records a failed attempt. The operation stays queued either
    /// way; returns true once it has reached the retry ceiling and
    /// should surface as a user-visible failure.
    pub fn mark_failed(&self, id: OperationId, error: &str) -> SyncResult<bool> {
        let attempts = self.store.mark_failed(id, error)?;
        let ceiling_hit = attempts >= self.retry_ceiling;
        if ceiling_hit {
            warn!(
                "op {} failed {} times (ceiling {}), surfacing as failed: {}",
                id, attempts, self.retry_ceiling, error
            );
        }
        Ok(ceiling_hit)
    }

    /// Returns every operation at the retry ceiling to the retryable
    /// pool by clearing its attempt count. The UI's manual-retry
    /// action; returns how many operations were reset.
    pub fn retry_failed(&self) -> SyncResult<usize> {
        let mut reset = 0;
        for op in self.store.pending_ops()? {
            if op.attempts >= self.retry_ceiling && self.store.reset_attempts(op.id)? {
                debug!("op {} returned to the retryable pool", op.id);
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// The "N pending / M failed" summary.
    pub fn status(&self) -> SyncResult<QueueStatus> {
        let ops = self.store.pending_ops()?;
        let failed = ops
            .iter()
            .filter(|op| op.attempts >= self.retry_ceiling)
            .count();
        Ok(QueueStatus {
            pending: ops.len(),
            failed,
        })
    }

    /// Whether anything is awaiting delivery.
    pub fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.store.is_empty()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queue(capacity: Option<usize>) -> SyncQueue {
        let store = QueueStore::open_in_memory().unwrap();
        SyncQueue::new(store, 3, capacity)
    }

    #[test]
    fn classify_flagged_payload_is_critical() {
        let op = StoredOperation {
            id: OperationId::new(),
            kind: EntityKind::Customer,
            op: OperationType::Update,
            entity_id: Some("c1".into()),
            payload: json!({"critical": true, "name": "Acme"}),
            enqueued_at: UpdatedAt::now(),
            attempts: 0,
            last_error: None,
        };
        assert_eq!(OpPriority::classify(&op), OpPriority::Critical);
    }

    #[test]
    fn classify_by_kind() {
        let mut op = StoredOperation {
            id: OperationId::new(),
            kind: EntityKind::Job,
            op: OperationType::Update,
            entity_id: Some("j1".into()),
            payload: json!({"status": "active"}),
            enqueued_at: UpdatedAt::now(),
            attempts: 0,
            last_error: None,
        };
        assert_eq!(OpPriority::classify(&op), OpPriority::Important);

        op.kind = EntityKind::Invoice;
        assert_eq!(OpPriority::classify(&op), OpPriority::Normal);
    }

    #[test]
    fn classify_photo_payload_does_not_outrank_kind() {
        let op = StoredOperation {
            id: OperationId::new(),
            kind: EntityKind::Customer,
            op: OperationType::Update,
            entity_id: Some("c1".into()),
            payload: json!({"photo": "site-before.jpg"}),
            enqueued_at: UpdatedAt::now(),
            attempts: 0,
            last_error: None,
        };
        assert_eq!(OpPriority::classify(&op), OpPriority::Normal);
    }

    #[test]
    fn capacity_cap_is_enforced() {
        let queue = queue(Some(2));
        for i in 0..2 {
            queue
                .enqueue(
                    EntityKind::Customer,
                    OperationType::Create,
                    None,
                    json!({"id": format!("c{i}")}),
                )
                .unwrap();
        }
        let overflow = queue.enqueue(
            EntityKind::Customer,
            OperationType::Create,
            None,
            json!({"id": "c2"}),
        );
        assert!(matches!(
            overflow,
            Err(SyncError::QueueOverflow { capacity: 2 })
        ));
    }

    #[test]
    fn failed_ops_stay_queued_until_ceiling() {
        let queue = queue(None);
        let id = queue
            .enqueue(
                EntityKind::Job,
                OperationType::Update,
                Some("j1".into()),
                json!({"status": "active"}),
            )
            .unwrap();

        assert!(!queue.mark_failed(id, "timeout").unwrap());
        assert!(!queue.mark_failed(id, "timeout").unwrap());
        assert!(queue.mark_failed(id, "timeout").unwrap());

        // Surfaced as failed but never discarded.
        let status = queue.status().unwrap();
        assert_eq!(status.pending, 1);
        assert_eq!(status.failed, 1);
        assert!(queue.retryable_ops().unwrap().is_empty());
    }

    #[test]
    fn retry_failed_returns_ceiling_hits_to_the_retryable_pool() {
        let queue = queue(None);
        let id = queue
            .enqueue(
                EntityKind::Customer,
                OperationType::Update,
                Some("c1".into()),
                json!({"name": "Acme"}),
            )
            .unwrap();
        for _ in 0..3 {
            queue.mark_failed(id, "timeout").unwrap();
        }
        assert!(queue.retryable_ops().unwrap().is_empty());

        assert_eq!(queue.retry_failed().unwrap(), 1);

        let status = queue.status().unwrap();
        assert_eq!(status.pending, 1);
        assert_eq!(status.failed, 0);
        let retryable = queue.retryable_ops().unwrap();
        assert_eq!(retryable.len(), 1);
        assert_eq!(retryable[0].attempts, 0);
        assert!(retryable[0].last_error.is_none());
    }

    #[test]
    fn pending_deletes_collects_entity_ids() {
        let queue = queue(None);
        queue
            .enqueue(
                EntityKind::Customer,
                OperationType::Delete,
                Some("c1".into()),
                json!({}),
            )
            .unwrap();
        queue
            .enqueue(
                EntityKind::Job,
                OperationType::Delete,
                Some("j1".into()),
                json!({}),
            )
            .unwrap();

        let deletes = queue.pending_deletes(EntityKind::Customer).unwrap();
        assert_eq!(deletes.len(), 1);
        assert!(deletes.contains("c1"));
    }
}

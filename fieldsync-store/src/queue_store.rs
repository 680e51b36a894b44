//! Durable queue of pending sync operations.
//!
//! Every sync-eligible local mutation appends an operation here. An
//! operation leaves the queue only through `mark_delivered`; failures
//! increment an attempt counter and keep the operation queued so it
//! stays retryable across restarts.

use crate::error::{StorageError, StorageResult};
use fieldsync_types::{EntityKind, OperationId, UpdatedAt};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// The kind of local mutation a queued operation represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    /// The storage/wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            other => Err(format!("unknown operation type: {other}")),
        }
    }
}

/// A queued sync operation as persisted.
#[derive(Debug, Clone)]
pub struct StoredOperation {
    pub id: OperationId,
    pub kind: EntityKind,
    pub op: OperationType,
    /// Target record id; `None` for operations whose payload carries
    /// the whole record (creates).
    pub entity_id: Option<String>,
    pub payload: Value,
    pub enqueued_at: UpdatedAt,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// Last transport error, if any attempt failed.
    pub last_error: Option<String>,
}

/// Durable sync operation queue backed by SQLite.
#[derive(Clone)]
pub struct QueueStore {
    conn: Arc<Mutex<Connection>>,
}

impl QueueStore {
    /// Opens (or creates) a queue store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory queue store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sync_queue (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                op TEXT NOT NULL,
                entity_id TEXT,
                payload TEXT NOT NULL,
                enqueued_wall_ms INTEGER NOT NULL,
                enqueued_counter INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            );
            ",
        )?;
        Ok(())
    }

    /// Appends an operation to the queue.
    pub fn enqueue(&self, op: &StoredOperation) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_queue (id, kind, op, entity_id, payload, enqueued_wall_ms, enqueued_counter, attempts, last_error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                op.id.to_string(),
                op.kind.as_str(),
                op.op.as_str(),
                op.entity_id,
                serde_json::to_string(&op.payload)?,
                op.enqueued_at.wall_ms() as i64,
                op.enqueued_at.counter() as i64,
                op.attempts,
                op.last_error,
            ],
        )?;
        debug!("enqueued {} {} op {}", op.kind, op.op.as_str(), op.id);
        Ok(())
    }

    /// Returns all queued operations in enqueue order.
    pub fn pending_ops(&self) -> StorageResult<Vec<StoredOperation>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, kind, op, entity_id, payload, enqueued_wall_ms, enqueued_counter, attempts, last_error
             FROM sync_queue ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, i64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, Option<String>>(8)?,
            ))
        })?;

        let mut ops = Vec::new();
        for row in rows {
            let (id, kind, op, entity_id, payload, wall_ms, counter, attempts, last_error) = row?;
            ops.push(StoredOperation {
                id: OperationId::parse(&id)
                    .map_err(|e| StorageError::Corrupt(format!("operation id: {e}")))?,
                kind: kind
                    .parse()
                    .map_err(|e| StorageError::Corrupt(format!("operation kind: {e}")))?,
                op: op
                    .parse()
                    .map_err(StorageError::Corrupt)?,
                entity_id,
                payload: serde_json::from_str(&payload)?,
                enqueued_at: UpdatedAt::new(wall_ms as u64, counter as u32),
                attempts: attempts as u32,
                last_error,
            });
        }
        Ok(ops)
    }

    /// Removes a delivered operation. Returns true if it was queued.
    pub fn mark_delivered(&self, id: OperationId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM sync_queue WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Records a failed delivery attempt. The operation stays queued.
    /// Returns the new attempt count.
    pub fn mark_failed(&self, id: OperationId, error: &str) -> StorageResult<u32> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sync_queue SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
            params![id.to_string(), error],
        )?;
        let attempts: i64 = conn.query_row(
            "SELECT attempts FROM sync_queue WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(attempts as u32)
    }

    /// Clears the attempt counter and last error of an operation so
    /// it can be retried fresh. Returns true if it was queued.
    pub fn reset_attempts(&self, id: OperationId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE sync_queue SET attempts = 0, last_error = NULL WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Returns the number of queued operations.
    pub fn len(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

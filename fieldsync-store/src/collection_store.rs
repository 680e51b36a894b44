//! Per-kind record collections, device identity, and sync bookkeeping.
//!
//! Records are stored as JSON rows keyed by (kind, id). The CRUD layer
//! reads and writes individual records; the sync engine loads whole
//! collections and writes back reconciled ones in a single transaction.

use crate::error::{StorageError, StorageResult};
use fieldsync_types::{DeviceRecord, EntityKind, SyncableRecord, UpdatedAt};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Local record collections backed by SQLite.
#[derive(Clone)]
pub struct CollectionStore {
    conn: Arc<Mutex<Connection>>,
}

impl CollectionStore {
    /// Opens (or creates) a collection store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Opens an in-memory collection store (for testing).
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
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            );

            CREATE TABLE IF NOT EXISTS device (
                singleton INTEGER PRIMARY KEY CHECK (singleton = 0),
                device_id TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS last_sync (
                kind TEXT PRIMARY KEY,
                wall_ms INTEGER NOT NULL,
                counter INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    // ── Collections ─────────────────────────────────────────────

    /// Loads the full collection for a kind, in id order.
    pub fn load_collection(&self, kind: EntityKind) -> StorageResult<Vec<SyncableRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT data FROM records WHERE kind = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row?;
            let record: SyncableRecord = serde_json::from_str(&raw)
                .map_err(|e| StorageError::Corrupt(format!("record in {kind}: {e}")))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Replaces the full collection for a kind with a reconciled one.
    ///
    /// Runs in a single transaction so a crash mid-write never leaves a
    /// half-merged collection.
    pub fn replace_collection(
        &self,
        kind: EntityKind,
        records: &[SyncableRecord],
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM records WHERE kind = ?1", params![kind.as_str()])?;
        {
            let mut stmt =
                tx.prepare("INSERT INTO records (kind, id, data) VALUES (?1, ?2, ?3)")?;
            for record in records {
                let data = serde_json::to_string(record)?;
                stmt.execute(params![kind.as_str(), record.id, data])?;
            }
        }
        tx.commit()?;
        debug!("replaced {} collection with {} records", kind, records.len());
        Ok(())
    }

    /// Inserts or updates a single record (CRUD-layer write path).
    pub fn upsert_record(&self, kind: EntityKind, record: &SyncableRecord) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        let data = serde_json::to_string(record)?;
        conn.execute(
            "INSERT INTO records (kind, id, data) VALUES (?1, ?2, ?3)
             ON CONFLICT (kind, id) DO UPDATE SET data = excluded.data",
            params![kind.as_str(), record.id, data],
        )?;
        Ok(())
    }

    /// Fetches a single record by id.
    pub fn get_record(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> StorageResult<Option<SyncableRecord>> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            Some(raw) => {
                let record = serde_json::from_str(&raw)
                    .map_err(|e| StorageError::Corrupt(format!("record {kind}/{id}: {e}")))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Deletes a single record. Returns true if a row was removed.
    pub fn delete_record(&self, kind: EntityKind, id: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM records WHERE kind = ?1 AND id = ?2",
            params![kind.as_str(), id],
        )?;
        Ok(changed > 0)
    }

    // ── Device identity ─────────────────────────────────────────

    /// Returns this installation's device record, generating and
    /// persisting it on first call.
    pub fn device_record(&self) -> StorageResult<DeviceRecord> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<String> = conn
            .query_row("SELECT device_id FROM device WHERE singleton = 0", [], |row| {
                row.get(0)
            })
            .optional()?;

        if let Some(raw) = existing {
            let device_id = raw
                .parse()
                .map_err(|e| StorageError::Corrupt(format!("device id: {e}")))?;
            return Ok(DeviceRecord { device_id });
        }

        let record = DeviceRecord::generate();
        conn.execute(
            "INSERT INTO device (singleton, device_id) VALUES (0, ?1)",
            params![record.device_id.to_string()],
        )?;
        info!("generated device id {}", record.device_id);
        Ok(record)
    }

    // ── Sync bookkeeping ────────────────────────────────────────

    /// Records the last successful sync stamp for a kind.
    pub fn set_last_sync(&self, kind: EntityKind, stamp: UpdatedAt) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO last_sync (kind, wall_ms, counter) VALUES (?1, ?2, ?3)
             ON CONFLICT (kind) DO UPDATE SET wall_ms = excluded.wall_ms, counter = excluded.counter",
            params![kind.as_str(), stamp.wall_ms() as i64, stamp.counter() as i64],
        )?;
        Ok(())
    }

    /// Returns the last successful sync stamp for a kind, if any.
    pub fn last_sync(&self, kind: EntityKind) -> StorageResult<Option<UpdatedAt>> {
        let conn = self.conn.lock().unwrap();
        let row: Option<(i64, i64)> = conn
            .query_row(
                "SELECT wall_ms, counter FROM last_sync WHERE kind = ?1",
                params![kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(wall_ms, counter)| UpdatedAt::new(wall_ms as u64, counter as u32)))
    }
}

//! The merge engine — reconciles divergent copies of a collection.
//!
//! Last-write-wins by recency stamp, with one hard rule: remote data
//! can only ever overwrite sync-eligible fields. Locally-retained
//! fields are always re-attached from the local copy, even when the
//! remote record (e.g. this device's own prior upload) happens to
//! carry them.
//!
//! The merge is idempotent and never drops a record by identity:
//! the result's id set is the union of the inputs'. Deletions are not
//! merge's concern — they are queued operations applied by the queue
//! consumer before merge runs.

use crate::filter::SnapshotFilter;
use fieldsync_types::{EntityKind, SyncableRecord};
use std::collections::BTreeMap;
use tracing::debug;

/// Reconciles a local and a remote collection of the same entity kind.
///
/// For each identity present in both, the record with the later
/// `updatedAt` supplies the syncable body; the local record's
/// locally-retained fields are re-attached regardless of the winner.
/// On an equal or missing stamp the local record wins (bias toward
/// not losing unsynced local edits). Solitary records are kept as-is.
#[must_use]
pub fn merge(
    kind: EntityKind,
    local: &[SyncableRecord],
    remote: &[SyncableRecord],
    filter: &SnapshotFilter,
) -> Vec<SyncableRecord> {
    let local_by_id: BTreeMap<&str, &SyncableRecord> =
        local.iter().map(|r| (r.id.as_str(), r)).collect();
    let remote_by_id: BTreeMap<&str, &SyncableRecord> =
        remote.iter().map(|r| (r.id.as_str(), r)).collect();

    let mut ids: Vec<&str> = local_by_id.keys().copied().collect();
    for id in remote_by_id.keys() {
        if !local_by_id.contains_key(id) {
            ids.push(id);
        }
    }
    ids.sort_unstable();

    let mut reconciled = Vec::with_capacity(ids.len());
    let mut remote_wins = 0usize;

    for id in ids {
        let merged = match (local_by_id.get(id), remote_by_id.get(id)) {
            (Some(local_rec), Some(remote_rec)) => {
                if remote_is_newer(local_rec, remote_rec) {
                    remote_wins += 1;
                    // Remote body restricted to sync-eligible fields,
                    // local complement re-attached.
                    let body = filter.split(kind, remote_rec).syncable;
                    let local_only = filter.split(kind, local_rec).local_only;
                    filter.reattach(body, local_only)
                } else {
                    (*local_rec).clone()
                }
            }
            (Some(local_rec), None) => (*local_rec).clone(),
            (None, Some(remote_rec)) => (*remote_rec).clone(),
            (None, None) => unreachable!("id came from one of the maps"),
        };
        reconciled.push(merged);
    }

    debug!(
        "merged {}: {} local + {} remote -> {} reconciled ({} remote wins)",
        kind,
        local.len(),
        remote.len(),
        reconciled.len(),
        remote_wins
    );

    reconciled
}

/// Remote wins only on a strictly later stamp; an equal or missing
/// stamp on either side keeps the local record.
fn remote_is_newer(local: &SyncableRecord, remote: &SyncableRecord) -> bool {
    match (local.updated_at, remote.updated_at) {
        (Some(local_at), Some(remote_at)) => remote_at > local_at,
        _ => false,
    }
}

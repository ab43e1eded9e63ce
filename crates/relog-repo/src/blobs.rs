use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use relog_types::{BlobRef, Cid};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::write::PreparedWrite;

/// Stored metadata for a blob referenced by at least one record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobMeta {
    pub cid: Cid,
    pub mime_type: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Blob bookkeeping for one repository.
///
/// Two tables: associations between a blob and the record URIs that
/// reference it, and metadata per blob. Inserts into both are
/// insert-or-ignore on their natural key, so re-processing the same writes
/// changes nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobTable {
    record_blobs: BTreeSet<(Cid, String)>,
    blobs: BTreeMap<Cid, BlobMeta>,
}

impl BlobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a blob/record association. Returns `false` if it already existed.
    pub fn insert_record_blob(&mut self, cid: Cid, uri: &str) -> bool {
        self.record_blobs.insert((cid, uri.to_string()))
    }

    /// Insert blob metadata. Returns `false` if the blob was already known;
    /// the existing row is left untouched.
    pub fn insert_blob(&mut self, blob: &BlobRef, now: DateTime<Utc>) -> bool {
        if self.blobs.contains_key(&blob.cid) {
            return false;
        }
        self.blobs.insert(
            blob.cid,
            BlobMeta {
                cid: blob.cid,
                mime_type: blob.mime_type.clone(),
                size: blob.size,
                created_at: now,
            },
        );
        true
    }

    /// Drop associations for every record the writes touch, then drop
    /// metadata for blobs no record references any more. Blobs referenced by
    /// the last write to each record keep their metadata.
    pub fn dereference(&mut self, writes: &[PreparedWrite]) -> Vec<Cid> {
        let last = last_writes(writes);
        if last.is_empty() {
            return Vec::new();
        }

        let mut candidates = BTreeSet::new();
        self.record_blobs.retain(|(cid, uri)| {
            if last.contains_key(uri) {
                candidates.insert(*cid);
                false
            } else {
                true
            }
        });

        let incoming: BTreeSet<Cid> = last
            .values()
            .flat_map(|w| w.blobs().iter().map(|b| b.cid))
            .collect();
        let still_referenced: BTreeSet<Cid> = self.record_blobs.iter().map(|(cid, _)| *cid).collect();

        let mut removed = Vec::new();
        for cid in candidates {
            if !incoming.contains(&cid) && !still_referenced.contains(&cid) && self.blobs.remove(&cid).is_some() {
                removed.push(cid);
            }
        }
        if !removed.is_empty() {
            debug!(count = removed.len(), "dereferenced blobs");
        }
        removed
    }

    /// Reconcile blob tables for a batch of writes: dereference first, then
    /// upsert association and metadata for the blobs of the last write to
    /// each record. Writes superseded later in the batch leave no rows.
    pub fn process_writes(&mut self, writes: &[PreparedWrite], now: DateTime<Utc>) {
        self.dereference(writes);
        for (uri, write) in last_writes(writes) {
            for blob in write.blobs() {
                self.insert_record_blob(blob.cid, &uri);
                self.insert_blob(blob, now);
            }
        }
    }

    pub fn get(&self, cid: &Cid) -> Option<&BlobMeta> {
        self.blobs.get(cid)
    }

    /// Blob identifiers referenced by a record URI.
    pub fn blobs_for_record(&self, uri: &str) -> Vec<Cid> {
        self.record_blobs
            .iter()
            .filter(|(_, u)| u == uri)
            .map(|(cid, _)| *cid)
            .collect()
    }

    /// Number of blob/record associations.
    pub fn association_count(&self) -> usize {
        self.record_blobs.len()
    }

    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }
}

/// Last write per record URI, in batch order.
fn last_writes(writes: &[PreparedWrite]) -> BTreeMap<String, &PreparedWrite> {
    writes.iter().map(|w| (w.uri(), w)).collect()
}

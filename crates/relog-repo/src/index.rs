use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use relog_types::{Cid, RecordPath, Revision};
use serde::{Deserialize, Serialize};

use crate::write::PreparedWrite;

/// Index entry for a live record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub cid: Cid,
    pub rev: Revision,
    pub indexed_at: DateTime<Utc>,
}

/// Record index of one repository: path to current record identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordIndex {
    records: BTreeMap<RecordPath, IndexedRecord>,
}

impl RecordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &RecordPath) -> Option<&IndexedRecord> {
        self.records.get(path)
    }

    pub fn contains(&self, path: &RecordPath) -> bool {
        self.records.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &RecordPath> {
        self.records.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RecordPath, &IndexedRecord)> {
        self.records.iter()
    }

    /// Apply writes in order: creates and updates upsert, deletes remove.
    /// Deleting an absent path is a no-op.
    pub fn apply(&mut self, writes: &[PreparedWrite], rev: &Revision, now: DateTime<Utc>) {
        for write in writes {
            match write.cid() {
                Some(cid) => {
                    self.records.insert(
                        write.path().clone(),
                        IndexedRecord {
                            cid,
                            rev: rev.clone(),
                            indexed_at: now,
                        },
                    );
                }
                None => {
                    self.records.remove(write.path());
                }
            }
        }
    }

    /// Record identifiers the writes would displace that no record references
    /// once the writes are applied.
    pub fn displaced_by(&self, writes: &[PreparedWrite]) -> BTreeSet<Cid> {
        let mut after: BTreeMap<&RecordPath, Cid> =
            self.records.iter().map(|(path, rec)| (path, rec.cid)).collect();
        let mut displaced = BTreeSet::new();

        for write in writes {
            if let Some(old) = after.get(write.path()) {
                displaced.insert(*old);
            }
            match write.cid() {
                Some(cid) => {
                    after.insert(write.path(), cid);
                }
                None => {
                    after.remove(write.path());
                }
            }
        }

        let surviving: BTreeSet<Cid> = after.values().copied().collect();
        displaced.retain(|cid| !surviving.contains(cid));
        displaced
    }
}

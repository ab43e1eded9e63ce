use chrono::{DateTime, Utc};
use relog_store::{BlockStore, MemoryBlockStore};
use relog_types::{Cid, Revision};
use serde::{Deserialize, Serialize};

use crate::blobs::BlobTable;
use crate::index::RecordIndex;

/// Current head of a repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRoot {
    pub cid: Cid,
    pub rev: Revision,
    pub indexed_at: DateTime<Utc>,
}

/// Complete state of one account's repository.
///
/// Owned by the actor store; mutated only through a
/// [`RepoTransaction`](crate::RepoTransaction).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    pub root: Option<RepoRoot>,
    pub blocks: MemoryBlockStore,
    pub index: RecordIndex,
    pub blobs: BlobTable,
}

impl RepoState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rev(&self) -> Option<&Revision> {
        self.root.as_ref().map(|r| &r.rev)
    }

    /// Short human-readable summary for operator output.
    pub fn summary(&self) -> RepoSummary {
        RepoSummary {
            root: self.root.as_ref().map(|r| r.cid),
            rev: self.rev().cloned(),
            records: self.index.len(),
            blocks: self.blocks.count(),
            block_bytes: self.blocks.total_bytes(),
            blobs: self.blobs.blob_count(),
            blob_associations: self.blobs.association_count(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSummary {
    pub root: Option<Cid>,
    pub rev: Option<Revision>,
    pub records: usize,
    pub blocks: usize,
    pub block_bytes: u64,
    pub blobs: usize,
    pub blob_associations: usize,
}

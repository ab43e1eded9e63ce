use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use relog_store::{BlockStore, CommitData};
use relog_types::{AccountId, Cid, Revision};
use tracing::debug;

use crate::error::{RepoError, RepoResult};
use crate::repo::{RepoRoot, RepoState};
use crate::write::PreparedWrite;

/// Mutable view of one repository inside an atomic unit.
///
/// Changes go to a working copy; the actor store publishes the copy only
/// after the closure returns `Ok` and the copy is persisted.
pub struct RepoTransaction<'a> {
    account: &'a AccountId,
    state: &'a mut RepoState,
    now: DateTime<Utc>,
}

impl<'a> RepoTransaction<'a> {
    pub(crate) fn new(account: &'a AccountId, state: &'a mut RepoState) -> Self {
        Self {
            account,
            state,
            now: Utc::now(),
        }
    }

    pub fn account(&self) -> &AccountId {
        self.account
    }

    pub fn current_root(&self) -> Option<&RepoRoot> {
        self.state.root.as_ref()
    }

    /// Read-only access to the working state.
    pub fn state(&self) -> &RepoState {
        self.state
    }

    /// Record identifiers the writes displace that nothing else references.
    pub fn removed_cids(&self, writes: &[PreparedWrite]) -> BTreeSet<Cid> {
        self.state.index.displaced_by(writes)
    }

    /// Write the commit's blocks, drop its removed blocks and move the root.
    pub fn apply_commit(&mut self, commit: &CommitData, is_genesis: bool) -> RepoResult<()> {
        match (&self.state.root, is_genesis) {
            (Some(root), true) => {
                return Err(RepoError::RootConflict {
                    account: self.account.clone(),
                    reason: format!("genesis commit onto existing root at {}", root.rev),
                });
            }
            (None, false) => {
                return Err(RepoError::RootConflict {
                    account: self.account.clone(),
                    reason: "commit onto empty repository".into(),
                });
            }
            _ => {}
        }

        self.state.blocks.apply_commit(commit)?;
        self.state.root = Some(RepoRoot {
            cid: commit.cid,
            rev: commit.rev.clone(),
            indexed_at: self.now,
        });
        debug!(
            account = %self.account,
            rev = %commit.rev,
            new_blocks = commit.new_blocks.len(),
            removed = commit.removed_cids.len(),
            "applied commit"
        );
        Ok(())
    }

    pub fn index_writes(&mut self, writes: &[PreparedWrite], rev: &Revision) {
        self.state.index.apply(writes, rev, self.now);
    }

    pub fn process_write_blobs(&mut self, writes: &[PreparedWrite]) {
        self.state.blobs.process_writes(writes, self.now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relog_crypto::ContentHasher;
    use crate::write::{RecordDelete, RecordWrite};
    use relog_store::BlockMap;
    use relog_types::{BlobRef, RecordPath};
    use serde_json::json;

    fn alice() -> AccountId {
        AccountId::new("did:plc:alice").unwrap()
    }

    fn commit(rev: &str, since: Option<Cid>, new_blocks: BlockMap, removed: BTreeSet<Cid>) -> CommitData {
        let mut relevant = new_blocks.clone();
        let cid = relevant.add(format!("commit {rev}").into_bytes());
        let mut blocks = new_blocks;
        blocks.add(format!("commit {rev}").into_bytes());
        CommitData {
            cid,
            rev: Revision::new(rev).unwrap(),
            since,
            prev: since,
            new_blocks: blocks,
            relevant_blocks: relevant,
            removed_cids: removed,
        }
    }

    #[test]
    fn create_then_delete_record() {
        let account = alice();
        let mut state = RepoState::new();
        let path = RecordPath::parse("app.bsky.feed.post/x").unwrap();
        let body = br#"{"text":"x"}"#.to_vec();

        let mut blocks = BlockMap::new();
        let record_cid = blocks.add(body);
        let create = vec![PreparedWrite::Create(RecordWrite {
            account: account.clone(),
            path: path.clone(),
            cid: record_cid,
            record: json!({"text": "x"}),
            blobs: vec![BlobRef {
                cid: ContentHasher::BLOB.hash(b"pic"),
                mime_type: "image/png".into(),
                size: 3,
            }],
        })];

        let genesis = commit("r1", None, blocks, BTreeSet::new());
        {
            let mut tx = RepoTransaction::new(&account, &mut state);
            assert!(tx.current_root().is_none());
            tx.apply_commit(&genesis, true).unwrap();
            tx.index_writes(&create, &genesis.rev);
            tx.process_write_blobs(&create);
        }
        assert_eq!(state.index.len(), 1);
        assert_eq!(state.blobs.association_count(), 1);
        assert!(state.blocks.has(&record_cid).unwrap());

        let delete = vec![PreparedWrite::Delete(RecordDelete {
            account: account.clone(),
            path: path.clone(),
        })];
        {
            let mut tx = RepoTransaction::new(&account, &mut state);
            let removed = tx.removed_cids(&delete);
            assert!(removed.contains(&record_cid));
            let next = commit("r2", Some(genesis.cid), BlockMap::new(), removed);
            tx.apply_commit(&next, false).unwrap();
            tx.index_writes(&delete, &next.rev);
            tx.process_write_blobs(&delete);
            assert_eq!(tx.current_root().unwrap().rev, next.rev);
        }
        assert!(state.index.is_empty());
        assert_eq!(state.blobs.association_count(), 0);
        assert!(!state.blocks.has(&record_cid).unwrap());
    }

    #[test]
    fn non_genesis_onto_empty_conflicts() {
        let account = alice();
        let mut state = RepoState::new();
        let mut tx = RepoTransaction::new(&account, &mut state);
        let c = commit("r2", Some(ContentHasher::BLOCK.hash(b"prev")), BlockMap::new(), BTreeSet::new());
        assert!(matches!(
            tx.apply_commit(&c, false),
            Err(RepoError::RootConflict { .. })
        ));
    }
}

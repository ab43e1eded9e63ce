use relog_types::Cid;
use serde::{Deserialize, Serialize};

use crate::block::BlockMap;
use crate::error::StoreResult;
use crate::traits::BlockStore;

/// In-memory, `BTreeMap`-based block store.
///
/// Lives inside a repository snapshot and is serialized with it. It carries
/// no lock of its own; the owning repository serializes access.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBlockStore {
    blocks: BlockMap,
}

impl MemoryBlockStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Return a sorted list of all block identifiers in the store.
    pub fn all_cids(&self) -> Vec<Cid> {
        self.blocks.cids().copied().collect()
    }

    /// Borrow the underlying block map.
    pub fn blocks(&self) -> &BlockMap {
        &self.blocks
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, cid: &Cid) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blocks.get(cid).map(<[u8]>::to_vec))
    }

    fn has(&self, cid: &Cid) -> StoreResult<bool> {
        Ok(self.blocks.has(cid))
    }

    fn put(&mut self, cid: Cid, bytes: Vec<u8>) -> StoreResult<()> {
        if self.blocks.has(&cid) {
            return Ok(());
        }
        self.blocks.set(cid, bytes)
    }

    fn delete(&mut self, cid: &Cid) -> StoreResult<bool> {
        Ok(self.blocks.delete(cid))
    }

    fn count(&self) -> usize {
        self.blocks.len()
    }

    fn total_bytes(&self) -> u64 {
        self.blocks.byte_size()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::commit::CommitData;
    use crate::error::StoreError;
    use relog_crypto::ContentHasher;
    use relog_types::Revision;

    fn commit(new_blocks: BlockMap, removed: &[Cid]) -> CommitData {
        let mut relevant = new_blocks.clone();
        let cid = relevant.add(b"commit".to_vec());
        CommitData {
            cid,
            rev: Revision::new("rev1").unwrap(),
            since: None,
            prev: None,
            new_blocks,
            relevant_blocks: relevant,
            removed_cids: removed.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    // -----------------------------------------------------------------------
    // Core CRUD
    // -----------------------------------------------------------------------

    #[test]
    fn put_and_get() {
        let mut store = MemoryBlockStore::new();
        let cid = ContentHasher::BLOCK.hash(b"hello");
        store.put(cid, b"hello".to_vec()).unwrap();
        assert_eq!(store.get(&cid).unwrap().as_deref(), Some(&b"hello"[..]));
        assert!(store.has(&cid).unwrap());
    }

    #[test]
    fn get_missing_returns_none() {
        let store = MemoryBlockStore::new();
        let cid = ContentHasher::BLOCK.hash(b"nope");
        assert!(store.get(&cid).unwrap().is_none());
    }

    #[test]
    fn put_is_idempotent() {
        let mut store = MemoryBlockStore::new();
        let cid = ContentHasher::BLOCK.hash(b"same");
        store.put(cid, b"same".to_vec()).unwrap();
        store.put(cid, b"same".to_vec()).unwrap();
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn put_rejects_mismatch() {
        let mut store = MemoryBlockStore::new();
        let cid = ContentHasher::BLOCK.hash(b"expected");
        let err = store.put(cid, b"actual".to_vec()).unwrap_err();
        assert!(matches!(err, StoreError::HashMismatch { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn delete_existing_and_missing() {
        let mut store = MemoryBlockStore::new();
        let cid = ContentHasher::BLOCK.hash(b"gone");
        store.put(cid, b"gone".to_vec()).unwrap();
        assert!(store.delete(&cid).unwrap());
        assert!(!store.delete(&cid).unwrap());
    }

    // -----------------------------------------------------------------------
    // Commit application
    // -----------------------------------------------------------------------

    #[test]
    fn apply_commit_writes_and_removes() {
        let mut store = MemoryBlockStore::new();
        let old = ContentHasher::BLOCK.hash(b"old record");
        store.put(old, b"old record".to_vec()).unwrap();

        let mut blocks = BlockMap::new();
        let new = blocks.add(b"new record".to_vec());
        store.apply_commit(&commit(blocks, &[old])).unwrap();

        assert!(store.has(&new).unwrap());
        assert!(!store.has(&old).unwrap());
        assert_eq!(store.total_bytes(), 10);
    }

    #[test]
    fn removed_block_rewritten_by_same_commit_survives() {
        let mut store = MemoryBlockStore::new();
        let mut blocks = BlockMap::new();
        let cid = blocks.add(b"kept".to_vec());
        store.put(cid, b"kept".to_vec()).unwrap();

        store.apply_commit(&commit(blocks, &[cid])).unwrap();
        assert!(store.has(&cid).unwrap());
    }

    #[test]
    fn apply_commit_twice_is_stable() {
        let mut store = MemoryBlockStore::new();
        let mut blocks = BlockMap::new();
        blocks.add(b"a".to_vec());
        blocks.add(b"b".to_vec());
        let c = commit(blocks, &[]);
        store.apply_commit(&c).unwrap();
        let snapshot = store.clone();
        store.apply_commit(&c).unwrap();
        assert_eq!(store, snapshot);
        assert_eq!(store.all_cids().len(), 2);
    }
}

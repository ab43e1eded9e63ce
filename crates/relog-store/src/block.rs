use std::collections::btree_map;
use std::collections::BTreeMap;

use relog_crypto::ContentHasher;
use relog_types::Cid;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Ordered map from content identifier to block bytes.
///
/// A `BlockMap` is the unit that commits carry: the new blocks a commit
/// introduces and the blocks needed to validate it. Iteration order is the
/// `Cid` order, which keeps encodings deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMap {
    blocks: BTreeMap<Cid, Vec<u8>>,
}

impl BlockMap {
    /// Create an empty block map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add raw bytes, returning their content identifier.
    pub fn add(&mut self, bytes: Vec<u8>) -> Cid {
        let cid = ContentHasher::BLOCK.hash(&bytes);
        self.blocks.insert(cid, bytes);
        cid
    }

    /// Insert bytes under an identifier after checking the identifier
    /// matches the bytes.
    pub fn set(&mut self, cid: Cid, bytes: Vec<u8>) -> StoreResult<()> {
        let computed = ContentHasher::BLOCK.hash(&bytes);
        if computed != cid {
            return Err(StoreError::HashMismatch { cid, computed });
        }
        self.blocks.insert(cid, bytes);
        Ok(())
    }

    pub fn get(&self, cid: &Cid) -> Option<&[u8]> {
        self.blocks.get(cid).map(Vec::as_slice)
    }

    pub fn has(&self, cid: &Cid) -> bool {
        self.blocks.contains_key(cid)
    }

    /// Remove a block. Returns `true` if it was present.
    pub fn delete(&mut self, cid: &Cid) -> bool {
        self.blocks.remove(cid).is_some()
    }

    /// Copy every block of `other` into this map.
    pub fn add_map(&mut self, other: &BlockMap) {
        for (cid, bytes) in other.iter() {
            self.blocks.insert(*cid, bytes.to_vec());
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Total payload bytes across all blocks.
    pub fn byte_size(&self) -> u64 {
        self.blocks.values().map(|b| b.len() as u64).sum()
    }

    pub fn cids(&self) -> impl Iterator<Item = &Cid> {
        self.blocks.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Cid, &[u8])> {
        self.blocks.iter().map(|(cid, bytes)| (cid, bytes.as_slice()))
    }
}

impl IntoIterator for BlockMap {
    type Item = (Cid, Vec<u8>);
    type IntoIter = btree_map::IntoIter<Cid, Vec<u8>>;

    fn into_iter(self) -> Self::IntoIter {
        self.blocks.into_iter()
    }
}

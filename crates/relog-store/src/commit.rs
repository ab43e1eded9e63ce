use std::collections::BTreeSet;

use relog_types::{Cid, Revision};
use serde::{Deserialize, Serialize};

use crate::block::BlockMap;

/// A commit ready to be applied to a repository's block store.
///
/// `new_blocks` are written, `removed_cids` are dropped. `relevant_blocks`
/// holds everything a reader needs to validate the commit (the commit node
/// and the blocks touched by its operations) and is kept for inspection only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitData {
    /// Identifier of the commit node; becomes the new repository root.
    pub cid: Cid,
    pub rev: Revision,
    /// Revision root the commit was built on, `None` for genesis.
    pub since: Option<Cid>,
    pub prev: Option<Cid>,
    pub new_blocks: BlockMap,
    pub relevant_blocks: BlockMap,
    pub removed_cids: BTreeSet<Cid>,
}

impl CommitData {
    /// True when the commit starts a new repository.
    pub fn is_genesis(&self) -> bool {
        self.since.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_no_since() {
        let mut blocks = BlockMap::new();
        let cid = blocks.add(b"root".to_vec());
        let mut commit = CommitData {
            cid,
            rev: Revision::new("3k2a").unwrap(),
            since: None,
            prev: None,
            new_blocks: blocks.clone(),
            relevant_blocks: blocks,
            removed_cids: BTreeSet::new(),
        };
        assert!(commit.is_genesis());
        commit.since = Some(cid);
        assert!(!commit.is_genesis());
    }
}

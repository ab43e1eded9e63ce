use relog_types::Cid;

use crate::block::BlockMap;
use crate::commit::CommitData;
use crate::error::StoreResult;

/// Content-addressed block store owned by a single repository.
///
/// Blocks are immutable once written; writing the same bytes twice is a
/// no-op. Stores are owned exclusively by the repository transaction that
/// mutates them, so mutation takes `&mut self`.
pub trait BlockStore: Send + Sync {
    /// Read a block by identifier. `Ok(None)` if absent.
    fn get(&self, cid: &Cid) -> StoreResult<Option<Vec<u8>>>;

    fn has(&self, cid: &Cid) -> StoreResult<bool>;

    /// Write a block after verifying `cid` matches the bytes.
    fn put(&mut self, cid: Cid, bytes: Vec<u8>) -> StoreResult<()>;

    /// Delete a block. Returns `true` if it existed.
    fn delete(&mut self, cid: &Cid) -> StoreResult<bool>;

    /// Write every block in `blocks`.
    ///
    /// Default implementation calls `put()` for each block.
    fn put_many(&mut self, blocks: &BlockMap) -> StoreResult<()> {
        for (cid, bytes) in blocks.iter() {
            self.put(*cid, bytes.to_vec())?;
        }
        Ok(())
    }

    /// Apply a commit: write its new blocks, then delete its removed ones.
    ///
    /// A block both written and removed by the same commit stays present.
    fn apply_commit(&mut self, commit: &CommitData) -> StoreResult<()> {
        for cid in &commit.removed_cids {
            if !commit.new_blocks.has(cid) {
                self.delete(cid)?;
            }
        }
        self.put_many(&commit.new_blocks)
    }

    /// Number of blocks stored.
    fn count(&self) -> usize;

    /// Total bytes across all stored blocks.
    fn total_bytes(&self) -> u64;
}

//! Content-addressed block storage for relog.
//!
//! Every piece of repository data (records and commit nodes alike) is stored
//! as an immutable block identified by the domain-separated BLAKE3 hash of
//! its bytes.
//!
//! # Building Blocks
//!
//! - [`BlockMap`] -- ordered `Cid → bytes` map, the unit a commit carries
//! - [`BlockBundle`] -- framed, CRC-checked serialization of a block map
//!   plus its root identifiers, as shipped inside commit events
//! - [`CommitData`] -- the outgoing commit record applied to a repository
//!
//! # Storage Backends
//!
//! All backends implement the [`BlockStore`] trait:
//!
//! - [`MemoryBlockStore`] -- `BTreeMap`-based store, persisted as part of a
//!   repository snapshot
//!
//! # Design Rules
//!
//! 1. Blocks are immutable once written (content addressing guarantees this).
//! 2. A block's identifier is recomputed on decode; mismatches are rejected.
//! 3. The store never interprets block contents -- it is a pure key-value store.

pub mod block;
pub mod bundle;
pub mod commit;
pub mod error;
pub mod memory;
pub mod traits;

pub use block::BlockMap;
pub use bundle::{BlockBundle, DecodedBundle};
pub use commit::CommitData;
pub use error::{StoreError, StoreResult};
pub use memory::MemoryBlockStore;
pub use traits::BlockStore;

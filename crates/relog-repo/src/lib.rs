//! Per-account repositories for relog.
//!
//! A repository is the content-addressed state of one account: its blocks,
//! the index of live records, and the bookkeeping of blobs those records
//! reference. Repositories change only through atomic transactions.
//!
//! # Key Types
//!
//! - [`PreparedWrite`] -- create, update or delete of one record, with the
//!   blobs a create or update references
//! - [`RecordIndex`] -- record path to current record identifier
//! - [`BlobTable`] -- blob/record associations and blob metadata
//! - [`RepoState`] -- everything a repository owns
//! - [`ActorStore`] -- durable per-account repositories with
//!   [`transact`](ActorStore::transact)
//! - [`AccountStore`] -- account records and storage locations
//!   ([`DiskAccountStore`], [`MemoryAccountStore`])

pub mod account;
pub mod actor_store;
pub mod blobs;
pub mod error;
pub mod index;
pub mod layout;
pub mod repo;
pub mod transaction;
pub mod write;

pub use account::{AccountRecord, AccountStore, DiskAccountStore, MemoryAccountStore};
pub use actor_store::ActorStore;
pub use blobs::{BlobMeta, BlobTable};
pub use error::{RepoError, RepoResult};
pub use index::{IndexedRecord, RecordIndex};
pub use repo::{RepoRoot, RepoState, RepoSummary};
pub use transaction::RepoTransaction;
pub use write::{find_blob_refs, PreparedWrite, RecordDelete, RecordWrite, WriteAction};

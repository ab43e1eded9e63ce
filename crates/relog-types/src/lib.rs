//! Foundation types for relog.
//!
//! This crate provides the identifier and ordering types shared by every
//! other relog crate: the content identifiers that address blocks, the
//! account identifiers that key repositories, the per-account revision
//! markers that order commits, and the record paths that address records
//! inside a repository.
//!
//! # Key Types
//!
//! - [`Cid`] -- Content identifier (BLAKE3 hash of block bytes)
//! - [`AccountId`] -- Decentralized identifier owning one repository
//! - [`Revision`] -- Per-account, lexicographically ordered commit marker
//! - [`RecordPath`] -- `collection/record-key` address of a record
//! - [`BlobRef`] -- Blob descriptor referenced from a record

pub mod account;
pub mod cid;
pub mod error;
pub mod record;
pub mod revision;

pub use account::AccountId;
pub use cid::Cid;
pub use error::TypeError;
pub use record::{BlobRef, RecordPath};
pub use revision::Revision;

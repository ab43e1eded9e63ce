//! Sequenced repository event log for relog.
//!
//! Every change to a hosted repository is sequenced as a [`SeqEvent`]: a
//! commit to an account's repository or a change in the account's status,
//! tagged with a strictly increasing sequence number. Recovery pages
//! through an [`EventSource`] by cursor and replays the events in order.
//!
//! Two sources are provided: [`MemorySequencer`] for tests and embedding,
//! and [`WalSequencer`], a CRC-framed append-only log file that survives
//! torn writes.

pub mod error;
pub mod event;
pub mod memory;
pub mod source;
pub mod wal;

pub use error::SequencerError;
pub use event::{AccountEvt, AccountStatus, CommitEvt, OpAction, RepoEvent, RepoOp, Seq, SeqEvent};
pub use memory::MemorySequencer;
pub use source::EventSource;
pub use wal::{SyncMode, WalConfig, WalSequencer};

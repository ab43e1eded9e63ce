//! Crash recovery for relog.
//!
//! After a crash the per-account repositories may lag behind the sequenced
//! event log. A [`Recoverer`] pages through the log from a cursor and
//! replays every event into the repositories:
//!
//! - commit events are applied when newer than the stored revision, creating
//!   the repository and account on a genesis commit
//! - account deletions remove the account's storage and record
//! - other account status changes are ignored
//!
//! Events of one account replay in log order on a [`PartitionedQueue`]
//! keyed by account; separate accounts replay in parallel with bounded
//! concurrency and backpressure on the fetch loop.
//!
//! ```text
//!   EventSource --fetch_range--> Recoverer --add_to_key--> PartitionedQueue
//!                                                              |
//!                                   process_commit / process_account
//!                                                              |
//!                                              ActorStore + AccountStore
//! ```
//!
//! [`PartitionedQueue`]: relog_queue::PartitionedQueue

pub mod commit;
pub mod config;
pub mod context;
pub mod deletion;
pub mod error;
pub mod recoverer;
pub mod report;

pub use commit::{format_commit, prepare_commit, process_commit, CommitOutcome, PreparedCommit};
pub use config::{FailurePolicy, RecoveryConfig};
pub use context::RecoveryContext;
pub use deletion::{process_account, AccountOutcome};
pub use error::{EventError, RecoveryError, RecoveryResult, TaskError, TaskResult};
pub use recoverer::{Recoverer, RecoveryState};
pub use report::{FailedAccount, RecoveryReport};

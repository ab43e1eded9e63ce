use relog_repo::RepoError;
use relog_sequencer::{Seq, SequencerError};
use relog_types::AccountId;

/// Failure of a single event-handling task.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// A task failure tagged with the event that caused it.
#[derive(Debug, thiserror::Error)]
#[error("event {seq} failed: {source}")]
pub struct EventError {
    pub seq: Seq,
    #[source]
    pub source: TaskError,
}

/// Errors that end a recovery run.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The configuration is unusable.
    #[error("invalid recovery config: {0}")]
    InvalidConfig(String),

    /// The event source failed. Dispatched work was drained first.
    #[error("event source failed after cursor {cursor}: {source}")]
    Source {
        cursor: Seq,
        #[source]
        source: SequencerError,
    },

    /// A task failed and the run was aborted.
    #[error("recovery failed for {account} at cursor {cursor}: {source}")]
    Task {
        account: AccountId,
        /// Sequence number of the failing event, when known.
        seq: Option<Seq>,
        /// Last cursor the run advanced to.
        cursor: Seq,
        #[source]
        source: TaskError,
    },

    /// The task queue stopped accepting work mid-run.
    #[error("task queue closed")]
    QueueClosed,
}

impl RecoveryError {
    /// Account named by a task failure.
    pub fn account(&self) -> Option<&AccountId> {
        match self {
            Self::Task { account, .. } => Some(account),
            _ => None,
        }
    }
}

pub type TaskResult<T> = Result<T, TaskError>;
pub type RecoveryResult<T> = Result<T, RecoveryError>;

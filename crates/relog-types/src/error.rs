use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid account identifier: {0}")]
    InvalidAccountId(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("invalid record path: {0}")]
    InvalidRecordPath(String),
}

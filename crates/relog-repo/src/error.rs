use relog_types::{AccountId, RecordPath};
use thiserror::Error;

/// Errors from repository and account storage.
#[derive(Debug, Error)]
pub enum RepoError {
    /// No repository exists for the account.
    #[error("repository not found for {0}")]
    RepoNotFound(AccountId),

    /// A repository already exists where a new one was requested.
    #[error("repository already exists for {0}")]
    RepoExists(AccountId),

    /// The account has no account record.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// Record bytes could not be decoded into a record.
    #[error("invalid record at {path}: {reason}")]
    InvalidRecord { path: RecordPath, reason: String },

    /// A genesis commit was applied to a repository that already has a root,
    /// or a non-genesis commit to one without.
    #[error("commit for {account} does not fit repository state: {reason}")]
    RootConflict { account: AccountId, reason: String },

    #[error("store error: {0}")]
    Store(#[from] relog_store::StoreError),

    #[error("type error: {0}")]
    Type(#[from] relog_types::TypeError),

    #[error("key error: {0}")]
    Key(#[from] relog_crypto::KeyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::Error> for RepoError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result alias for repository operations.
pub type RepoResult<T> = Result<T, RepoError>;

use relog_types::Cid;

/// Errors from block storage operations.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(Cid),

    /// Content hash mismatch (data corruption or forged identifier).
    #[error("hash mismatch for {cid}: computed {computed}")]
    HashMismatch { cid: Cid, computed: Cid },

    /// The bundle header is malformed and no blocks can be read from it.
    #[error("malformed block bundle: {0}")]
    MalformedBundle(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

use std::io;

use crate::event::Seq;

/// Errors produced by event sources.
#[derive(Debug, thiserror::Error)]
pub enum SequencerError {
    /// I/O error during log file operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// CRC integrity check failed for a log entry.
    #[error("CRC integrity check failed at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    /// Log entry has an invalid length field.
    #[error("invalid log entry length {length} at offset {offset}")]
    InvalidEntryLength { offset: u64, length: u32 },

    /// An appended event does not extend the sequence.
    #[error("sequence number {got} does not follow {last}")]
    NonMonotonicSeq { last: Seq, got: Seq },

    /// The event source could not serve the request.
    #[error("event source unavailable: {0}")]
    Unavailable(String),
}

impl From<bincode::Error> for SequencerError {
    fn from(e: bincode::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Convenience alias used throughout the sequencer crate.
pub type Result<T> = std::result::Result<T, SequencerError>;

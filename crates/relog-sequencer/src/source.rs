use async_trait::async_trait;

use crate::error::Result;
use crate::event::{Seq, SeqEvent};

/// Ordered, paginated source of sequenced events.
///
/// Implementations must satisfy:
/// - `fetch_range(after, limit)` returns at most `limit` events with
///   `seq > after`, in ascending order, with no gaps among the events the
///   source holds.
/// - An empty result means the end of the log.
/// - Re-reading a range returns the same events.
/// - Transport failures are returned as errors, never retried internally.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_range(&self, after: Seq, limit: usize) -> Result<Vec<SeqEvent>>;

    /// Highest sequence number currently in the log, if any.
    async fn last_seq(&self) -> Result<Option<Seq>>;
}

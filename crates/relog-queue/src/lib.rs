//! Per-key bounded task queue for relog.
//!
//! [`PartitionedQueue`] runs asynchronous tasks grouped by key. Tasks that
//! share a key run sequentially in submission order; tasks with different
//! keys run in parallel under a global concurrency ceiling. Producers apply
//! backpressure with [`on_empty`](PartitionedQueue::on_empty) and collect
//! the outcome with [`process_all`](PartitionedQueue::process_all).
//!
//! Each task runs on its own tokio task, so a panic is reported as
//! [`QueueError::Panicked`] instead of taking the worker down.

pub mod error;
pub mod queue;

pub use error::QueueError;
pub use queue::PartitionedQueue;

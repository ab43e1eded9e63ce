use std::fmt::{Debug, Display};

/// Errors surfaced by the partitioned queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError<K, E>
where
    K: Debug + Display,
    E: std::error::Error + 'static,
{
    /// The queue was destroyed and accepts no more tasks.
    #[error("queue is closed")]
    Closed,

    /// A task returned an error.
    #[error("task for {key} failed: {source}")]
    Task {
        key: K,
        #[source]
        source: E,
    },

    /// A task panicked. The panic is contained to the task.
    #[error("task for {key} panicked: {message}")]
    Panicked { key: K, message: String },
}

impl<K, E> QueueError<K, E>
where
    K: Debug + Display,
    E: std::error::Error + 'static,
{
    /// Key of the failing task, if the error belongs to one.
    pub fn key(&self) -> Option<&K> {
        match self {
            Self::Closed => None,
            Self::Task { key, .. } | Self::Panicked { key, .. } => Some(key),
        }
    }
}

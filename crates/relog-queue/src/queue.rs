use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error};

use crate::error::QueueError;

type Task<E> = BoxFuture<'static, Result<(), E>>;

struct State<K, E>
where
    K: Debug + Display,
    E: std::error::Error + 'static,
{
    /// Pending tasks per key. A key is present while its worker runs.
    pending: HashMap<K, VecDeque<Task<E>>>,
    /// Queued plus running tasks.
    loaded: usize,
    peak: usize,
    failures: Vec<QueueError<K, E>>,
    closed: bool,
}

struct Inner<K, E>
where
    K: Debug + Display,
    E: std::error::Error + 'static,
{
    state: Mutex<State<K, E>>,
    permits: Arc<Semaphore>,
    concurrency: usize,
    loaded_tx: watch::Sender<usize>,
}

/// Task queue partitioned by key.
///
/// - Tasks with the same key run one at a time, in the order they were
///   added.
/// - Tasks with different keys run concurrently, at most `concurrency` at
///   once across all keys.
/// - A failing or panicking task is recorded with its key; other keys keep
///   running.
///
/// The number of queued plus running tasks ("loaded") is published on a
/// `watch` channel so producers can wait for pressure to subside.
pub struct PartitionedQueue<K, E>
where
    K: Debug + Display,
    E: std::error::Error + 'static,
{
    inner: Arc<Inner<K, E>>,
}

impl<K, E> Clone for PartitionedQueue<K, E>
where
    K: Debug + Display,
    E: std::error::Error + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, E> PartitionedQueue<K, E>
where
    K: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    /// Create a queue running at most `concurrency` tasks at once.
    /// A ceiling of zero is raised to one.
    pub fn new(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let (loaded_tx, _loaded_rx) = watch::channel(0usize);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    pending: HashMap::new(),
                    loaded: 0,
                    peak: 0,
                    failures: Vec::new(),
                    closed: false,
                }),
                permits: Arc::new(Semaphore::new(concurrency)),
                concurrency,
                loaded_tx,
            }),
        }
    }

    /// Append a task to `key`'s queue. Never blocks.
    ///
    /// If `key` has no running worker one is spawned; it starts the task as
    /// soon as a concurrency slot is free.
    pub fn add_to_key<F>(&self, key: K, task: F) -> Result<(), QueueError<K, E>>
    where
        F: Future<Output = Result<(), E>> + Send + 'static,
    {
        let spawn_worker = {
            let mut state = self.inner.state.lock().expect("lock poisoned");
            if state.closed {
                return Err(QueueError::Closed);
            }
            state.loaded += 1;
            state.peak = state.peak.max(state.loaded);
            self.inner.loaded_tx.send_replace(state.loaded);

            match state.pending.get_mut(&key) {
                Some(queue) => {
                    queue.push_back(task.boxed());
                    false
                }
                None => {
                    state.pending.insert(key.clone(), VecDeque::from([task.boxed()]));
                    true
                }
            }
        };

        if spawn_worker {
            tokio::spawn(run_key(Arc::clone(&self.inner), key));
        }
        Ok(())
    }

    /// Wait until at most `low_water` tasks are queued or running.
    pub async fn on_empty(&self, low_water: usize) {
        let mut rx = self.inner.loaded_tx.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|loaded| *loaded <= low_water).await;
    }

    /// Wait for every task to finish, then surface the first recorded
    /// failure. Failures after the first stay available through
    /// [`take_failures`](Self::take_failures).
    pub async fn process_all(&self) -> Result<(), QueueError<K, E>> {
        self.on_empty(0).await;
        let mut state = self.inner.state.lock().expect("lock poisoned");
        if state.failures.is_empty() {
            Ok(())
        } else {
            Err(state.failures.remove(0))
        }
    }

    /// Stop accepting tasks and discard those not yet started. Running tasks
    /// finish normally. Returns the number of discarded tasks.
    pub fn destroy(&self) -> usize {
        let mut state = self.inner.state.lock().expect("lock poisoned");
        state.closed = true;
        let mut discarded = 0;
        for queue in state.pending.values_mut() {
            discarded += queue.len();
            queue.clear();
        }
        state.loaded -= discarded;
        self.inner.loaded_tx.send_replace(state.loaded);
        if discarded > 0 {
            debug!(discarded, "queue destroyed with pending tasks");
        }
        discarded
    }

    /// Drain all recorded failures.
    pub fn take_failures(&self) -> Vec<QueueError<K, E>> {
        std::mem::take(&mut self.inner.state.lock().expect("lock poisoned").failures)
    }

    /// Whether any task has failed and not yet been surfaced.
    pub fn is_failed(&self) -> bool {
        !self.inner.state.lock().expect("lock poisoned").failures.is_empty()
    }

    /// Queued plus running tasks.
    pub fn loaded(&self) -> usize {
        *self.inner.loaded_tx.borrow()
    }

    /// Highest `loaded` value observed.
    pub fn peak_loaded(&self) -> usize {
        self.inner.state.lock().expect("lock poisoned").peak
    }

    /// Keys with queued or running tasks.
    pub fn active_keys(&self) -> usize {
        self.inner.state.lock().expect("lock poisoned").pending.len()
    }

    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().expect("lock poisoned").closed
    }
}

impl<K, E> Debug for PartitionedQueue<K, E>
where
    K: Debug + Display,
    E: std::error::Error + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionedQueue")
            .field("concurrency", &self.inner.concurrency)
            .field("loaded", &*self.inner.loaded_tx.borrow())
            .finish()
    }
}

/// Worker for one key: runs the key's tasks in order until its queue is
/// empty, then retires.
async fn run_key<K, E>(inner: Arc<Inner<K, E>>, key: K)
where
    K: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    loop {
        let task = {
            let mut state = inner.state.lock().expect("lock poisoned");
            let next = state.pending.get_mut(&key).and_then(VecDeque::pop_front);
            match next {
                Some(task) => task,
                None => {
                    state.pending.remove(&key);
                    return;
                }
            }
        };

        // The semaphore is never closed.
        let permit = Arc::clone(&inner.permits).acquire_owned().await.ok();
        let outcome = tokio::spawn(task).await;
        drop(permit);

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(source)) => {
                error!(key = %key, error = %source, "queued task failed");
                Some(QueueError::Task {
                    key: key.clone(),
                    source,
                })
            }
            Err(join) => {
                let message = panic_message(join);
                error!(key = %key, %message, "queued task panicked");
                Some(QueueError::Panicked {
                    key: key.clone(),
                    message,
                })
            }
        };

        let mut state = inner.state.lock().expect("lock poisoned");
        if let Some(failure) = failure {
            state.failures.push(failure);
        }
        state.loaded -= 1;
        inner.loaded_tx.send_replace(state.loaded);
    }
}

fn panic_message(join: tokio::task::JoinError) -> String {
    if !join.is_panic() {
        return "task cancelled".into();
    }
    let payload = join.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".into()
    }
}

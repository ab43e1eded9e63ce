use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use futures::FutureExt;
use relog_queue::{PartitionedQueue, QueueError};
use relog_sequencer::{RepoEvent, Seq, SeqEvent};
use relog_types::AccountId;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::commit::{process_commit, CommitOutcome};
use crate::config::{FailurePolicy, RecoveryConfig};
use crate::context::RecoveryContext;
use crate::deletion::{process_account, AccountOutcome};
use crate::error::{EventError, RecoveryError, RecoveryResult, TaskError, TaskResult};
use crate::report::{Counters, FailedAccount, RecoveryReport};

/// Phase of a recovery run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecoveryState {
    /// Fetching the next page of events.
    Loading,
    /// Waiting for queued work to fall to the low-water mark.
    Draining,
    /// The log is exhausted; waiting for every task to finish.
    Flushing,
    Done,
    Failed,
}

impl std::fmt::Display for RecoveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Loading => "loading",
            Self::Draining => "draining",
            Self::Flushing => "flushing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

type AccountQueue = PartitionedQueue<AccountId, EventError>;
type FailedSet = Arc<Mutex<HashSet<AccountId>>>;

/// Replays the event log into per-account repositories.
///
/// The run pages through the event source from the cursor, hands each event
/// to a task keyed by its account and advances the cursor once a page has
/// been dispatched. Events of one account apply in log order; different
/// accounts proceed in parallel up to the configured concurrency. Fetching
/// pauses whenever more than `low_water` tasks are outstanding, which keeps
/// the total under `high_water`.
///
/// Replaying from any earlier cursor is safe: commits at or below a
/// repository's stored revision are skipped and deletions tolerate missing
/// state.
pub struct Recoverer {
    ctx: RecoveryContext,
    config: RecoveryConfig,
    cursor: AtomicU64,
    state_tx: watch::Sender<RecoveryState>,
}

impl Recoverer {
    pub fn new(ctx: RecoveryContext, config: RecoveryConfig) -> RecoveryResult<Self> {
        config.validate()?;
        let (state_tx, _state_rx) = watch::channel(RecoveryState::Loading);
        Ok(Self {
            ctx,
            cursor: AtomicU64::new(config.start_cursor),
            config,
            state_tx,
        })
    }

    /// Sequence number of the last dispatched event.
    pub fn cursor(&self) -> Seq {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> RecoveryState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<RecoveryState> {
        self.state_tx.subscribe()
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Replay every event after the cursor.
    ///
    /// Under [`FailurePolicy::AbortRun`] the first failing task stops
    /// fetching; work already dispatched for other accounts still finishes
    /// and the error names the failing account. Under
    /// [`FailurePolicy::SkipAccount`] failures land in the report and the
    /// failed account's later events are skipped.
    pub async fn run(&self) -> RecoveryResult<RecoveryReport> {
        info!(
            cursor = self.cursor(),
            concurrency = self.config.concurrency,
            page_size = self.config.page_size,
            policy = %self.config.failure_policy,
            "starting recovery"
        );
        let queue = AccountQueue::new(self.config.concurrency);
        let counters = Arc::new(Counters::default());
        let failed: FailedSet = Arc::new(Mutex::new(HashSet::new()));

        let result = self.drive(&queue, &counters, &failed).await;
        queue.destroy();
        let report = counters.snapshot(self.cursor(), queue.peak_loaded());

        match result {
            Ok(()) => {
                self.set_state(RecoveryState::Done);
                info!(
                    cursor = report.cursor,
                    events = report.events_seen,
                    applied = report.commits_applied,
                    skipped = report.commits_skipped,
                    genesis = report.genesis_created,
                    deleted = report.accounts_deleted,
                    failures = report.failures.len(),
                    "recovery complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(RecoveryState::Failed);
                error!(cursor = report.cursor, events = report.events_seen, error = %e, "recovery failed");
                Err(e)
            }
        }
    }

    async fn drive(&self, queue: &AccountQueue, counters: &Arc<Counters>, failed: &FailedSet) -> RecoveryResult<()> {
        let policy = self.config.failure_policy;
        let mut cursor = self.cursor();

        loop {
            if policy == FailurePolicy::AbortRun && queue.is_failed() {
                debug!(cursor, "task failed; stopping fetch");
                break;
            }

            self.set_state(RecoveryState::Loading);
            let page = match self.ctx.events.fetch_range(cursor, self.config.page_size).await {
                Ok(page) => page,
                Err(source) => {
                    // Dispatched tasks finish first. A task failure among them
                    // is reported instead of the transport error.
                    if let Err(failure) = queue.process_all().await {
                        warn!(cursor, error = %source, "event source failed after a task failure");
                        return Err(task_failure(failure, cursor));
                    }
                    return Err(RecoveryError::Source { cursor, source });
                }
            };
            if page.is_empty() {
                break;
            }

            let fetched = page.len();
            for event in page {
                if event.seq <= cursor {
                    warn!(seq = event.seq, cursor, "event source returned an event at or before the cursor");
                    continue;
                }
                let seq = event.seq;
                Counters::bump(&counters.events_seen);
                let account = event.event.account().clone();
                let task = run_event(
                    self.ctx.clone(),
                    event,
                    Arc::clone(counters),
                    Arc::clone(failed),
                    policy,
                );
                queue.add_to_key(account, task).map_err(|_| RecoveryError::QueueClosed)?;
                cursor = seq;
            }
            self.cursor.store(cursor, Ordering::SeqCst);
            debug!(cursor, fetched, loaded = queue.loaded(), "dispatched page");

            if queue.loaded() > self.config.low_water {
                self.set_state(RecoveryState::Draining);
                queue.on_empty(self.config.low_water).await;
            }
        }

        self.set_state(RecoveryState::Flushing);
        queue.process_all().await.map_err(|failure| task_failure(failure, cursor))
    }

    fn set_state(&self, next: RecoveryState) {
        self.state_tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            debug!(from = %state, to = %next, "recovery state");
            *state = next;
            true
        });
    }
}

impl std::fmt::Debug for Recoverer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recoverer")
            .field("cursor", &self.cursor())
            .field("state", &self.state())
            .field("config", &self.config)
            .finish()
    }
}

fn task_failure(failure: QueueError<AccountId, EventError>, cursor: Seq) -> RecoveryError {
    match failure {
        QueueError::Task { key, source } => RecoveryError::Task {
            account: key,
            seq: Some(source.seq),
            cursor,
            source: source.source,
        },
        QueueError::Panicked { key, message } => RecoveryError::Task {
            account: key,
            seq: None,
            cursor,
            source: TaskError::Panicked(message),
        },
        QueueError::Closed => RecoveryError::QueueClosed,
    }
}

/// Task body for one event: skips accounts that already failed, catches
/// panics and applies the failure policy.
async fn run_event(
    ctx: RecoveryContext,
    event: SeqEvent,
    counters: Arc<Counters>,
    failed: FailedSet,
    policy: FailurePolicy,
) -> Result<(), EventError> {
    let seq = event.seq;
    let account = event.event.account().clone();
    let already_failed = {
        let failed = failed.lock().expect("lock poisoned");
        failed.contains(&account)
    };
    if already_failed {
        Counters::bump(&counters.skipped_after_failure);
        debug!(account = %account, seq, "skipping event of failed account");
        return Ok(());
    }

    let outcome = AssertUnwindSafe(handle_event(&ctx, &event.event, &counters))
        .catch_unwind()
        .await;
    let source = match outcome {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => e,
        Err(panic) => TaskError::Panicked(panic_message(panic)),
    };

    failed.lock().expect("lock poisoned").insert(account.clone());
    match policy {
        FailurePolicy::AbortRun => Err(EventError { seq, source }),
        FailurePolicy::SkipAccount => {
            warn!(account = %account, seq, error = %source, "event failed; skipping account");
            counters.record_failure(FailedAccount {
                account,
                seq,
                error: source.to_string(),
            });
            Ok(())
        }
    }
}

async fn handle_event(ctx: &RecoveryContext, event: &RepoEvent, counters: &Counters) -> TaskResult<()> {
    match event {
        RepoEvent::Commit(evt) => match process_commit(ctx, evt).await? {
            CommitOutcome::Applied { genesis, ops_dropped } => {
                Counters::bump(&counters.commits_applied);
                if genesis {
                    Counters::bump(&counters.genesis_created);
                }
                Counters::add(&counters.ops_dropped, ops_dropped as u64);
            }
            CommitOutcome::Skipped => Counters::bump(&counters.commits_skipped),
        },
        RepoEvent::Account(evt) => match process_account(ctx, evt).await? {
            AccountOutcome::Deleted => Counters::bump(&counters.accounts_deleted),
            AccountOutcome::Ignored => Counters::bump(&counters.events_ignored),
        },
    }
    Ok(())
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relog_repo::{ActorStore, MemoryAccountStore};
    use relog_sequencer::{AccountEvt, AccountStatus, MemorySequencer};

    fn context(root: &std::path::Path, events: MemorySequencer) -> RecoveryContext {
        RecoveryContext::new(
            Arc::new(events),
            Arc::new(MemoryAccountStore::new(root)),
            Arc::new(ActorStore::new(root)),
        )
    }

    fn takedown(name: &str) -> RepoEvent {
        RepoEvent::Account(AccountEvt {
            account: AccountId::new(format!("did:plc:{name}")).unwrap(),
            status: AccountStatus::Takendown,
        })
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecoveryConfig {
            concurrency: 0,
            ..Default::default()
        };
        let err = Recoverer::new(context(dir.path(), MemorySequencer::new()), config).unwrap_err();
        assert!(matches!(err, RecoveryError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn empty_log_finishes_done() {
        let dir = tempfile::tempdir().unwrap();
        let config = RecoveryConfig {
            start_cursor: 7,
            ..Default::default()
        };
        let recoverer = Recoverer::new(context(dir.path(), MemorySequencer::new()), config).unwrap();
        let mut states = recoverer.subscribe_state();

        let report = recoverer.run().await.unwrap();
        assert_eq!(report.cursor, 7);
        assert_eq!(report.events_seen, 0);
        assert_eq!(recoverer.state(), RecoveryState::Done);
        assert_eq!(*states.borrow_and_update(), RecoveryState::Done);
    }

    #[tokio::test]
    async fn pages_advance_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let events = MemorySequencer::from_events((0..5).map(|i| takedown(&format!("u{i}"))));
        let config = RecoveryConfig {
            page_size: 2,
            low_water: 2,
            high_water: 4,
            ..Default::default()
        };
        let recoverer = Recoverer::new(context(dir.path(), events), config).unwrap();

        let report = recoverer.run().await.unwrap();
        assert_eq!(recoverer.cursor(), 5);
        assert_eq!(report.events_seen, 5);
        assert_eq!(report.events_ignored, 5);
    }

    #[tokio::test]
    async fn resumes_after_start_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let events = MemorySequencer::from_events((0..5).map(|i| takedown(&format!("u{i}"))));
        let config = RecoveryConfig {
            start_cursor: 3,
            ..Default::default()
        };
        let recoverer = Recoverer::new(context(dir.path(), events), config).unwrap();
        let report = recoverer.run().await.unwrap();
        assert_eq!(report.events_seen, 2);
        assert_eq!(report.cursor, 5);
    }

    #[test]
    fn panic_messages() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "owned");
        assert_eq!(panic_message(Box::new(42u8)), "unknown panic");
    }
}

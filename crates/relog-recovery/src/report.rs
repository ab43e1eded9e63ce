use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use relog_sequencer::Seq;
use relog_types::AccountId;
use serde::{Deserialize, Serialize};

/// An account whose event failed under [`FailurePolicy::SkipAccount`].
///
/// [`FailurePolicy::SkipAccount`]: crate::FailurePolicy::SkipAccount
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAccount {
    pub account: AccountId,
    pub seq: Seq,
    pub error: String,
}

/// Summary of a finished recovery run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Last cursor the run advanced to.
    pub cursor: Seq,
    pub events_seen: u64,
    pub commits_applied: u64,
    /// Commits at or below the stored revision.
    pub commits_skipped: u64,
    pub genesis_created: u64,
    pub accounts_deleted: u64,
    /// Account events with a status other than `deleted`.
    pub events_ignored: u64,
    /// Operations dropped because their data could not be resolved.
    pub ops_dropped: u64,
    /// Events not run because their account had already failed.
    pub skipped_after_failure: u64,
    /// Highest number of queued plus running tasks.
    pub peak_loaded: usize,
    pub failures: Vec<FailedAccount>,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Counters shared by the tasks of a run.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub events_seen: AtomicU64,
    pub commits_applied: AtomicU64,
    pub commits_skipped: AtomicU64,
    pub genesis_created: AtomicU64,
    pub accounts_deleted: AtomicU64,
    pub events_ignored: AtomicU64,
    pub ops_dropped: AtomicU64,
    pub skipped_after_failure: AtomicU64,
    pub failures: Mutex<Vec<FailedAccount>>,
}

impl Counters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_failure(&self, failure: FailedAccount) {
        self.failures.lock().expect("lock poisoned").push(failure);
    }

    pub fn snapshot(&self, cursor: Seq, peak_loaded: usize) -> RecoveryReport {
        let mut failures = self.failures.lock().expect("lock poisoned").clone();
        failures.sort_by_key(|f| f.seq);
        RecoveryReport {
            cursor,
            events_seen: self.events_seen.load(Ordering::Relaxed),
            commits_applied: self.commits_applied.load(Ordering::Relaxed),
            commits_skipped: self.commits_skipped.load(Ordering::Relaxed),
            genesis_created: self.genesis_created.load(Ordering::Relaxed),
            accounts_deleted: self.accounts_deleted.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            ops_dropped: self.ops_dropped.load(Ordering::Relaxed),
            skipped_after_failure: self.skipped_after_failure.load(Ordering::Relaxed),
            peak_loaded,
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_orders_failures_by_seq() {
        let counters = Counters::default();
        Counters::bump(&counters.events_seen);
        Counters::add(&counters.ops_dropped, 3);
        for seq in [9, 2] {
            counters.record_failure(FailedAccount {
                account: AccountId::new("did:plc:alice").unwrap(),
                seq,
                error: "boom".into(),
            });
        }

        let report = counters.snapshot(10, 4);
        assert_eq!(report.cursor, 10);
        assert_eq!(report.events_seen, 1);
        assert_eq!(report.ops_dropped, 3);
        assert_eq!(report.peak_loaded, 4);
        assert_eq!(report.failures[0].seq, 2);
        assert!(!report.is_clean());
    }

    #[test]
    fn report_serializes_to_json() {
        let report = RecoveryReport {
            cursor: 5,
            commits_applied: 2,
            ..Default::default()
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["cursor"], 5);
        assert_eq!(json["commits_applied"], 2);
        assert!(json["failures"].as_array().unwrap().is_empty());
    }
}

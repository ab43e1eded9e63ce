use relog_sequencer::Seq;
use serde::{Deserialize, Serialize};

use crate::error::{RecoveryError, RecoveryResult};

/// What to do when handling an event fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Stop fetching, drain dispatched work and end the run `Failed`.
    #[default]
    AbortRun,
    /// Record the failure, skip the account's later events and keep going.
    SkipAccount,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AbortRun => write!(f, "abort-run"),
            Self::SkipAccount => write!(f, "skip-account"),
        }
    }
}

/// Configuration for a recovery run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Replay events with `seq` greater than this.
    pub start_cursor: Seq,
    /// Maximum tasks running at once across all accounts.
    pub concurrency: usize,
    /// Events requested per fetch.
    pub page_size: usize,
    /// Queued plus running tasks never exceed this.
    pub high_water: usize,
    /// Fetching resumes once load falls to this.
    pub low_water: usize,
    pub failure_policy: FailurePolicy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            start_cursor: 0,
            concurrency: 16,
            page_size: 500,
            high_water: 1000,
            low_water: 500,
            failure_policy: FailurePolicy::AbortRun,
        }
    }
}

impl RecoveryConfig {
    /// Check the limits are coherent.
    ///
    /// A full page dispatched at low water must still fit under high water,
    /// so `low_water + page_size <= high_water`.
    pub fn validate(&self) -> RecoveryResult<()> {
        if self.concurrency == 0 {
            return Err(RecoveryError::InvalidConfig("concurrency must be at least 1".into()));
        }
        if self.page_size == 0 {
            return Err(RecoveryError::InvalidConfig("page_size must be at least 1".into()));
        }
        if self.low_water > self.high_water {
            return Err(RecoveryError::InvalidConfig(format!(
                "low_water ({}) exceeds high_water ({})",
                self.low_water, self.high_water
            )));
        }
        if self.low_water.saturating_add(self.page_size) > self.high_water {
            return Err(RecoveryError::InvalidConfig(format!(
                "low_water ({}) + page_size ({}) exceeds high_water ({})",
                self.low_water, self.page_size, self.high_water
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let c = RecoveryConfig::default();
        assert_eq!(c.start_cursor, 0);
        assert_eq!(c.failure_policy, FailurePolicy::AbortRun);
        c.validate().unwrap();
    }

    #[test]
    fn rejects_zero_limits() {
        let c = RecoveryConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(RecoveryError::InvalidConfig(_))));

        let c = RecoveryConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_inverted_water_marks() {
        let c = RecoveryConfig {
            low_water: 10,
            high_water: 5,
            page_size: 1,
            ..Default::default()
        };
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_page_that_overflows_high_water() {
        let c = RecoveryConfig {
            low_water: 10,
            high_water: 15,
            page_size: 6,
            ..Default::default()
        };
        assert!(c.validate().is_err());
        let c = RecoveryConfig { page_size: 5, ..c };
        c.validate().unwrap();
    }

    #[test]
    fn toml_with_partial_fields() {
        let c: RecoveryConfig = toml::from_str(
            r#"
            start_cursor = 42
            failure_policy = "skip-account"
            "#,
        )
        .unwrap();
        assert_eq!(c.start_cursor, 42);
        assert_eq!(c.failure_policy, FailurePolicy::SkipAccount);
        assert_eq!(c.concurrency, RecoveryConfig::default().concurrency);
    }
}

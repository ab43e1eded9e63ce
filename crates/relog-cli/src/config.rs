use std::path::{Path, PathBuf};

use anyhow::Context;
use relog_recovery::RecoveryConfig;
use relog_sequencer::WalConfig;
use serde::{Deserialize, Serialize};

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "relog.toml";

/// Settings for the `relog` binary.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Root of the account and repository stores.
    pub data_dir: PathBuf,
    /// Event log file.
    pub log_path: PathBuf,
    pub recovery: RecoveryConfig,
    pub wal: WalConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_path: PathBuf::from("events.wal"),
            recovery: RecoveryConfig::default(),
            wal: WalConfig::default(),
        }
    }
}

impl CliConfig {
    /// Load from `path`, or from `relog.toml` in the working directory when
    /// present, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => PathBuf::from(DEFAULT_CONFIG_FILE),
            None => return Ok(Self::default()),
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relog_recovery::FailurePolicy;
    use relog_sequencer::SyncMode;

    #[test]
    fn default_config() {
        let c = CliConfig::default();
        assert_eq!(c.data_dir, PathBuf::from("data"));
        assert_eq!(c.log_path, PathBuf::from("events.wal"));
        assert_eq!(c.recovery, RecoveryConfig::default());
        assert_eq!(c.wal.sync_mode, SyncMode::OsDefault);
    }

    #[test]
    fn parse_full_file() {
        let c = CliConfig::parse(
            r#"
            data_dir = "/var/lib/relog"
            log_path = "/var/lib/relog/events.wal"

            [recovery]
            concurrency = 8
            page_size = 100
            low_water = 100
            high_water = 400
            failure_policy = "skip-account"

            [wal]
            sync_mode = "every-write"
            "#,
        )
        .unwrap();
        assert_eq!(c.data_dir, PathBuf::from("/var/lib/relog"));
        assert_eq!(c.recovery.concurrency, 8);
        assert_eq!(c.recovery.failure_policy, FailurePolicy::SkipAccount);
        assert_eq!(c.wal.sync_mode, SyncMode::EveryWrite);
        c.recovery.validate().unwrap();
    }

    #[test]
    fn missing_sections_use_defaults() {
        let c = CliConfig::parse("data_dir = \"d\"").unwrap();
        assert_eq!(c.recovery, RecoveryConfig::default());
        assert_eq!(c.log_path, PathBuf::from("events.wal"));
    }

    #[test]
    fn load_reads_given_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relog.toml");
        std::fs::write(&path, "log_path = \"x.wal\"\n").unwrap();
        let c = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(c.log_path, PathBuf::from("x.wal"));
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }
}

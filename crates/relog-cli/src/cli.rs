use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "relog",
    about = "relog: rebuild account repositories by replaying the event log",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file (defaults to ./relog.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Replay the event log into the repository stores
    Recover(RecoverArgs),
    /// Append events from a JSON-lines file to the event log
    Append(AppendArgs),
    /// List events after a cursor
    Events(EventsArgs),
    /// Show an account's repository state
    Inspect(InspectArgs),
}

/// Paths shared by every command; override the config file.
#[derive(Args, Clone, Default)]
pub struct StoreArgs {
    /// Event log file
    #[arg(long)]
    pub log: Option<PathBuf>,
    /// Root of the account and repository stores
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args)]
pub struct RecoverArgs {
    #[command(flatten)]
    pub stores: StoreArgs,
    /// Replay events after this sequence number
    #[arg(long)]
    pub start_cursor: Option<u64>,
    #[arg(long)]
    pub concurrency: Option<usize>,
    #[arg(long)]
    pub page_size: Option<usize>,
    #[arg(long)]
    pub high_water: Option<usize>,
    #[arg(long)]
    pub low_water: Option<usize>,
    /// Record failing accounts and keep going instead of aborting
    #[arg(long)]
    pub skip_failed: bool,
}

#[derive(Args)]
pub struct AppendArgs {
    /// JSON-lines file of events; `-` reads stdin
    pub input: PathBuf,
    #[command(flatten)]
    pub stores: StoreArgs,
}

#[derive(Args)]
pub struct EventsArgs {
    #[command(flatten)]
    pub stores: StoreArgs,
    /// List events after this sequence number
    #[arg(long, default_value = "0")]
    pub after: u64,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Account identifier, e.g. did:plc:abc
    pub account: String,
    #[command(flatten)]
    pub stores: StoreArgs,
    /// List record paths
    #[arg(long)]
    pub records: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recover() {
        let cli = Cli::try_parse_from(["relog", "recover"]).unwrap();
        if let Command::Recover(args) = cli.command {
            assert!(args.start_cursor.is_none());
            assert!(!args.skip_failed);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_recover_overrides() {
        let cli = Cli::try_parse_from([
            "relog",
            "recover",
            "--log",
            "/tmp/e.wal",
            "--start-cursor",
            "42",
            "--concurrency",
            "4",
            "--skip-failed",
        ])
        .unwrap();
        if let Command::Recover(args) = cli.command {
            assert_eq!(args.stores.log, Some(PathBuf::from("/tmp/e.wal")));
            assert_eq!(args.start_cursor, Some(42));
            assert_eq!(args.concurrency, Some(4));
            assert!(args.skip_failed);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_append() {
        let cli = Cli::try_parse_from(["relog", "append", "events.jsonl"]).unwrap();
        if let Command::Append(args) = cli.command {
            assert_eq!(args.input, PathBuf::from("events.jsonl"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_events() {
        let cli = Cli::try_parse_from(["relog", "events", "--after", "10", "-n", "5"]).unwrap();
        if let Command::Events(args) = cli.command {
            assert_eq!(args.after, 10);
            assert_eq!(args.limit, 5);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_inspect() {
        let cli = Cli::try_parse_from(["relog", "inspect", "did:plc:alice", "--records"]).unwrap();
        if let Command::Inspect(args) = cli.command {
            assert_eq!(args.account, "did:plc:alice");
            assert!(args.records);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from(["relog", "--verbose", "--format", "json", "events"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.format, OutputFormat::Json));
    }
}

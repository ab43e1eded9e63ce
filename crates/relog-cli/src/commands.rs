use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use relog_recovery::{FailurePolicy, Recoverer, RecoveryContext, RecoveryError, RecoveryReport};
use relog_repo::{AccountStore, ActorStore, DiskAccountStore};
use relog_sequencer::{EventSource, RepoEvent, SeqEvent, WalConfig, WalSequencer};
use relog_types::AccountId;
use serde::Deserialize;
use serde_json::json;

use crate::cli::*;
use crate::config::CliConfig;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = CliConfig::load(cli.config.as_deref())?;
    let runtime = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Recover(args) => {
            apply_stores(&mut config, &args.stores);
            runtime.block_on(cmd_recover(config, args, &cli.format))
        }
        Command::Append(args) => {
            apply_stores(&mut config, &args.stores);
            cmd_append(&config, &args)
        }
        Command::Events(args) => {
            apply_stores(&mut config, &args.stores);
            runtime.block_on(cmd_events(&config, &args, &cli.format))
        }
        Command::Inspect(args) => {
            apply_stores(&mut config, &args.stores);
            runtime.block_on(cmd_inspect(&config, &args, &cli.format))
        }
    }
}

fn apply_stores(config: &mut CliConfig, stores: &StoreArgs) {
    if let Some(log) = &stores.log {
        config.log_path = log.clone();
    }
    if let Some(dir) = &stores.data_dir {
        config.data_dir = dir.clone();
    }
}

fn open_log(path: &Path, wal: &WalConfig) -> anyhow::Result<WalSequencer> {
    WalSequencer::open(path, wal.clone()).with_context(|| format!("opening event log {}", path.display()))
}

async fn cmd_recover(mut config: CliConfig, args: RecoverArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let recovery = &mut config.recovery;
    if let Some(cursor) = args.start_cursor {
        recovery.start_cursor = cursor;
    }
    if let Some(n) = args.concurrency {
        recovery.concurrency = n;
    }
    if let Some(n) = args.page_size {
        recovery.page_size = n;
    }
    if let Some(n) = args.high_water {
        recovery.high_water = n;
    }
    if let Some(n) = args.low_water {
        recovery.low_water = n;
    }
    if args.skip_failed {
        recovery.failure_policy = FailurePolicy::SkipAccount;
    }

    if !config.log_path.exists() {
        bail!("event log {} does not exist", config.log_path.display());
    }
    let events = open_log(&config.log_path, &config.wal)?;
    let accounts = DiskAccountStore::open(&config.data_dir).await?;
    let ctx = RecoveryContext::new(
        Arc::new(events),
        Arc::new(accounts),
        Arc::new(ActorStore::new(&config.data_dir)),
    );
    let recoverer = Recoverer::new(ctx, config.recovery.clone())?;

    match recoverer.run().await {
        Ok(report) => {
            print_report(&report, format)?;
            Ok(())
        }
        Err(e) => {
            print_failure(&e, recoverer.cursor());
            Err(e.into())
        }
    }
}

fn print_report(report: &RecoveryReport, format: &OutputFormat) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let mark = if report.is_clean() {
        "✓".green().bold()
    } else {
        "!".yellow().bold()
    };
    println!("{} Recovery complete at cursor {}", mark, report.cursor.to_string().bold());
    println!("  Events:    {}", report.events_seen);
    println!(
        "  Commits:   {} applied, {} skipped, {} genesis",
        report.commits_applied.to_string().green(),
        report.commits_skipped,
        report.genesis_created
    );
    println!(
        "  Accounts:  {} deleted, {} status events ignored",
        report.accounts_deleted, report.events_ignored
    );
    if report.ops_dropped > 0 {
        println!("  Dropped:   {} malformed operations", report.ops_dropped.to_string().yellow());
    }
    println!("  Peak load: {}", report.peak_loaded);
    for failure in &report.failures {
        println!(
            "  {} {} at seq {}: {}",
            "failed".red(),
            failure.account.to_string().bold(),
            failure.seq,
            failure.error
        );
    }
    if report.skipped_after_failure > 0 {
        println!("  Skipped:   {} events of failed accounts", report.skipped_after_failure);
    }
    Ok(())
}

fn print_failure(err: &RecoveryError, cursor: u64) {
    eprintln!("{} Recovery failed at cursor {}", "✗".red().bold(), cursor.to_string().bold());
    if let Some(account) = err.account() {
        eprintln!("  Account: {}", account.to_string().yellow());
    }
    eprintln!("  Restart with --start-cursor {} or lower.", cursor);
}

/// One line of an append input: a pre-sequenced event or a bare event that
/// takes the next sequence number.
#[derive(Deserialize)]
#[serde(untagged)]
enum InputLine {
    Sequenced(SeqEvent),
    Bare(RepoEvent),
}

fn cmd_append(config: &CliConfig, args: &AppendArgs) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = if args.input.as_os_str() == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = std::fs::File::open(&args.input)
            .with_context(|| format!("opening {}", args.input.display()))?;
        Box::new(BufReader::new(file))
    };

    let log = open_log(&config.log_path, &config.wal)?;
    let mut appended = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: InputLine =
            serde_json::from_str(&line).with_context(|| format!("line {}: not an event", n + 1))?;
        match parsed {
            InputLine::Sequenced(event) => {
                log.append_sequenced(&event)
                    .with_context(|| format!("line {}: appending seq {}", n + 1, event.seq))?;
            }
            InputLine::Bare(event) => {
                log.append(event).with_context(|| format!("line {}", n + 1))?;
            }
        }
        appended += 1;
    }

    println!(
        "{} Appended {} events to {} ({} total)",
        "✓".green().bold(),
        appended,
        config.log_path.display(),
        log.len()
    );
    Ok(())
}

async fn cmd_events(config: &CliConfig, args: &EventsArgs, format: &OutputFormat) -> anyhow::Result<()> {
    if !config.log_path.exists() {
        bail!("event log {} does not exist", config.log_path.display());
    }
    let log = open_log(&config.log_path, &config.wal)?;
    let events = log.fetch_range(args.after, args.limit).await?;

    if let OutputFormat::Json = format {
        for event in &events {
            println!("{}", serde_json::to_string(event)?);
        }
        return Ok(());
    }

    if events.is_empty() {
        println!("No events after {}.", args.after);
        return Ok(());
    }
    for event in &events {
        let detail = match &event.event {
            RepoEvent::Commit(c) => format!(
                "rev {} {} ops{}",
                c.rev,
                c.ops.len(),
                if c.is_genesis() { " (genesis)" } else { "" }
            ),
            RepoEvent::Account(a) => a.status.to_string(),
        };
        println!(
            "{:>8}  {:<8} {}  {}",
            event.seq.to_string().yellow(),
            event.event.kind().cyan(),
            event.event.account(),
            detail.dimmed()
        );
    }
    Ok(())
}

async fn cmd_inspect(config: &CliConfig, args: &InspectArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let account = AccountId::new(args.account.as_str())?;
    let actors = ActorStore::new(&config.data_dir);
    if !actors.exists(&account).await? {
        bail!("no repository for {account} under {}", config.data_dir.display());
    }
    let accounts = DiskAccountStore::open(&config.data_dir).await?;
    let record = accounts.get_account(&account).await?;
    let (summary, paths) = actors
        .read(&account, |state| {
            let paths: Vec<String> = state.index.paths().map(ToString::to_string).collect();
            (state.summary(), paths)
        })
        .await?;

    if let OutputFormat::Json = format {
        let mut out = json!({
            "account": account,
            "summary": summary,
            "signingKey": record.as_ref().map(|r| r.signing_key.clone()),
        });
        if args.records {
            out["records"] = json!(paths);
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("Account {}", account.to_string().bold());
    match &summary.rev {
        Some(rev) => println!("  Revision: {}", rev.to_string().yellow()),
        None => println!("  Revision: {}", "(empty)".dimmed()),
    }
    if let Some(root) = summary.root {
        println!("  Root:     {}", root.short_hex().cyan());
    }
    match &record {
        Some(r) => println!("  Key:      {}", r.signing_key.dimmed()),
        None => println!("  Key:      {}", "no account record".red()),
    }
    println!("  Records:  {}", summary.records);
    println!("  Blocks:   {} ({} bytes)", summary.blocks, summary.block_bytes);
    println!(
        "  Blobs:    {} ({} record references)",
        summary.blobs, summary.blob_associations
    );
    if args.records {
        for path in &paths {
            println!("    {}", path);
        }
    }
    Ok(())
}

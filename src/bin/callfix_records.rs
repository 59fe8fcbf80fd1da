//! Operator tool for a folder of stored call records.
//!
//! - `list`: fixtures and their record indices
//! - `verify`: parse every record, fail if any is malformed
//! - `prune`: delete records past a given index (stale calls)
#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use callfix::config::RunConfig;
use callfix::{CallRecord, FsRecordStore, RecordKey, RecordStore};
use clap::{Parser, Subcommand};
use futures::executor::block_on;
use serde::Serialize;

#[derive(Debug, Parser)]
#[command(name = "callfix-records", about = "Inspect and maintain stored call records")]
struct Cli {
    /// Records folder (defaults to CALLFIX_RECORDS_DIR or tests/fixtures/calls)
    #[arg(long, global = true)]
    dir: Option<PathBuf>,

    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List fixtures and their stored indices
    List {
        #[arg(long)]
        name: Option<String>,
    },
    /// Check that every stored record is well formed
    Verify,
    /// Delete records with an index above --keep
    Prune {
        #[arg(long)]
        name: String,
        #[arg(long)]
        keep: u32,
        /// Only report what would be deleted
        #[arg(long)]
        dry_run: bool,
    },
}

#[derive(Debug, Serialize)]
struct FixtureSummary {
    name: String,
    indices: Vec<u32>,
}

#[derive(Debug, Serialize)]
struct VerifyIssue {
    record: String,
    error: String,
}

fn main() {
    if let Err(err) = main_impl() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn main_impl() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let dir = cli
        .dir
        .clone()
        .unwrap_or_else(|| RunConfig::from_env().records_dir());
    let store = FsRecordStore::new(dir);

    match cli.command {
        Command::List { name } => list(&store, name.as_deref(), cli.json),
        Command::Verify => verify(&store, cli.json),
        Command::Prune {
            name,
            keep,
            dry_run,
        } => prune(&store, &name, keep, dry_run),
    }
}

fn list(store: &FsRecordStore, name: Option<&str>, json: bool) -> Result<()> {
    let summaries: Vec<FixtureSummary> = store
        .list_all()
        .with_context(|| format!("listing {}", store.dir().display()))?
        .into_iter()
        .filter(|(fixture, _)| name.is_none_or(|wanted| wanted == fixture))
        .map(|(name, indices)| FixtureSummary { name, indices })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No call records in {}", store.dir().display());
        return Ok(());
    }
    for summary in &summaries {
        let indices: Vec<String> = summary.indices.iter().map(u32::to_string).collect();
        println!(
            "{} ({} records): {}",
            summary.name,
            summary.indices.len(),
            indices.join(", ")
        );
    }
    Ok(())
}

fn verify(store: &FsRecordStore, json: bool) -> Result<()> {
    let mut issues = Vec::new();
    let mut checked = 0usize;
    for (name, indices) in store.list_all()? {
        for index in indices {
            let key = RecordKey::new(&name, index)?;
            let Some(text) = block_on(store.read(&key))? else {
                continue;
            };
            checked += 1;
            let parsed = CallRecord::parse(&key.file_name(), &text);
            let error = match parsed {
                Ok(record) => match record.to_canonical_string() {
                    Ok(canonical) if canonical == text => continue,
                    Ok(_) => "not in canonical form (re-record to normalize)".to_string(),
                    Err(err) => err.to_string(),
                },
                Err(err) => err.to_string(),
            };
            issues.push(VerifyIssue {
                record: key.file_name(),
                error,
            });
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "checked": checked,
                "issues": issues,
            }))?
        );
    } else {
        for issue in &issues {
            println!("{}: {}", issue.record, issue.error);
        }
        println!("Checked {checked} record(s), {} issue(s)", issues.len());
    }

    if !issues.is_empty() {
        bail!("{} call record(s) need attention", issues.len());
    }
    Ok(())
}

fn prune(store: &FsRecordStore, name: &str, keep: u32, dry_run: bool) -> Result<()> {
    let indices = block_on(store.list_indices(name))?;
    let stale: Vec<u32> = indices.into_iter().filter(|index| *index > keep).collect();
    if stale.is_empty() {
        println!("Nothing to prune for {name}");
        return Ok(());
    }
    for index in stale {
        let key = RecordKey::new(name, index)?;
        if dry_run {
            println!("would delete {}", store.path_for(&key).display());
            continue;
        }
        if block_on(store.remove(&key))? {
            println!("deleted {}", store.path_for(&key).display());
        }
    }
    Ok(())
}

//! # Snaptar CLI - timestamped snapshots of a directory
//!
//! Archives a source directory into a timestamped tar file inside a target
//! directory, then optionally removes duplicate archives from the target.
//!
//! ## Usage
//! ```bash
//! # Snapshot ./workspace into ./backups
//! snaptar --src ./workspace --target ./backups
//!
//! # Snapshot and prune duplicates, keeping the newest copy
//! snaptar --src ./workspace --target ./backups --delete-old
//!
//! # Preview what would be pruned
//! snaptar --src ./workspace --target ./backups --delete-old --dry-run
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, ValueEnum};
use colored::*;
use humantime::format_duration;
use indicatif::{ProgressBar, ProgressStyle};
use snaptar::{
    ProgressInfo, RetentionPolicy, SnapshotBuilder, SnapshotConfig, SnapshotOutcome,
    SnaptarError,
};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

/// Snaptar CLI - snapshot a directory into a timestamped tar archive
#[derive(Parser)]
#[command(name = "snaptar")]
#[command(author = "Mufeed VH <mufeed@asterisk.so>")]
#[command(version)]
#[command(about = "Snapshot a directory into a timestamped tar archive")]
#[command(long_about = None)]
struct Cli {
    /// Directory to archive
    #[arg(long)]
    src: PathBuf,

    /// Directory that receives the archive
    #[arg(long)]
    target: PathBuf,

    /// Remove duplicate files from the target after archiving
    #[arg(long)]
    delete_old: bool,

    /// strftime template for the archive name [default: workspace-%Y-%m-%dT%H:%M:%S%:z.tar]
    #[arg(long, value_name = "TEMPLATE")]
    format: Option<String>,

    /// Which duplicates to remove
    #[arg(long, value_enum)]
    policy: Option<PolicyMode>,

    /// Report duplicates without deleting them
    #[arg(long)]
    dry_run: bool,

    /// Write the archive directly to its final path
    #[arg(long)]
    no_atomic: bool,

    /// Only deduplicate the top level of the target
    #[arg(long)]
    no_recursive_dedup: bool,

    /// Exclude files matching a glob (repeatable)
    #[arg(short, long, value_name = "GLOB")]
    exclude: Vec<String>,

    /// Load settings from a JSON file; flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// Show a spinner while archiving
    #[arg(long)]
    progress: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum PolicyMode {
    /// Keep the newest copy of each file
    NewestWins,
    /// Remove files identical to the new archive
    MatchArchive,
}

impl From<PolicyMode> for RetentionPolicy {
    fn from(mode: PolicyMode) -> Self {
        match mode {
            PolicyMode::NewestWins => RetentionPolicy::NewestWins,
            PolicyMode::MatchArchive => RetentionPolicy::MatchArchive,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Disable colors if needed
    if std::env::var("NO_COLOR").is_ok() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli) {
        eprintln!("{}: {}", "Error".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".yellow(), cause);
        }
        if let Some(err) = e.downcast_ref::<SnaptarError>() {
            let hint = err.user_message();
            if hint != err.to_string() {
                eprintln!("  {} {}", "hint:".cyan(), hint);
            }
        }
        std::process::exit(1);
    }
}

/// Merge the config file with explicit flags
fn load_config(cli: &Cli) -> Result<SnapshotConfig> {
    let mut config = match &cli.config {
        Some(path) => SnapshotConfig::from_json_file(path)
            .with_context(|| format!("failed to load config {:?}", path))?,
        None => SnapshotConfig::default(),
    };

    if let Some(format) = &cli.format {
        config.name_format = format.clone();
    }
    if let Some(policy) = cli.policy {
        config.retention = policy.into();
    }
    if cli.delete_old {
        config.delete_duplicates = true;
    }
    if cli.dry_run {
        config.dry_run = true;
    }
    if cli.no_atomic {
        config.atomic = false;
    }
    if cli.no_recursive_dedup {
        config.recursive_dedup = false;
    }
    config.exclude_patterns.extend(cli.exclude.iter().cloned());

    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let snapshot = SnapshotBuilder::from_config(config).build(&cli.src, &cli.target)?;

    if !cli.json {
        println!(
            "{} {} {} {}",
            "Archiving".blue().bold(),
            snapshot.source().display(),
            "into".blue().bold(),
            snapshot.target().display()
        );
        let config = snapshot.config();
        if config.delete_duplicates && config.dry_run {
            println!("  {}", "Dry run: duplicates are reported, not deleted".yellow());
        }
    }

    let start = Instant::now();
    let spinner = if cli.progress && !cli.json {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Scanning files...");
        Some(pb)
    } else {
        None
    };

    let callback = spinner.as_ref().map(|pb| {
        move |info: ProgressInfo| {
            let item = info.current_item.unwrap_or_default();
            pb.set_message(format!("{} {} ({} files)", info.operation, item, info.processed));
        }
    });
    let result = snapshot.run_at_with_progress(&Local::now(), callback);

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let outcome = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome, start.elapsed());
    }

    Ok(())
}

fn print_outcome(outcome: &SnapshotOutcome, elapsed: Duration) {
    let archive = &outcome.archive;
    println!(
        "{} Created {}",
        "✓".green().bold(),
        archive.archive_path.display().to_string().yellow().bold()
    );
    println!("  Files: {}", archive.entries_written.to_string().cyan());
    println!("  Content: {}", format_bytes(archive.bytes_written).cyan());
    println!("  Archive: {}", format_bytes(archive.archive_size).cyan());

    if let Some(report) = &outcome.dedup {
        let verb = if report.dry_run { "Would remove" } else { "Removed" };
        if report.has_deletions() {
            println!(
                "{} {} duplicate file(s), {} reclaimed",
                verb.yellow().bold(),
                report.deleted_count(),
                format_bytes(report.bytes_reclaimed)
            );
            for path in &report.deleted {
                println!("  {} {}", "-".red(), path.display());
            }
        } else {
            println!("{} No duplicates found", "✓".green().bold());
        }
    }

    println!("  Time: {}", format_duration(truncate_millis(elapsed)).to_string().cyan());
}

/// Drop sub-millisecond noise from a duration
fn truncate_millis(duration: Duration) -> Duration {
    Duration::from_millis(duration.as_millis() as u64)
}

/// Format bytes in human-readable form
fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

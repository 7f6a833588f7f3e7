//! moodlog - record moods locally and sync them when the network allows
//!
//! Uses XDG Base Directory specification for file locations:
//! - Queue: $XDG_DATA_HOME/moodlog/mood_log.csv (~/.local/share/moodlog/mood_log.csv)
//! - Logs: $XDG_STATE_HOME/moodlog/moodlog.log.YYYY-MM-DD (~/.local/state/moodlog/)
//! - Config: $XDG_CONFIG_HOME/moodlog/config.toml (~/.config/moodlog/config.toml)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use moodlog_core::sync::StatusSink;
use moodlog_core::{resolve_mood, Config, DurableQueue, Recorder, SkipReason, SyncResult, SyncStatus};

#[derive(Parser)]
#[command(name = "moodlog")]
#[command(about = "Record moods offline and sync them to a collector")]
#[command(version)]
struct Args {
    /// Also log to stderr
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a mood (by number or label), then sync if online
    Record {
        /// Mood number (1-based) or exact label
        mood: String,
    },

    /// Sync queued records now
    Sync,

    /// Show configuration and queue status
    Status,

    /// List queued records
    List,

    /// List known moods
    Moods,
}

/// Prints upload progress to the terminal
struct ConsoleStatus;

impl StatusSink for ConsoleStatus {
    fn uploading_started(&self, pending: usize) {
        println!("Uploading {} record(s)...", pending);
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = moodlog_core::logging::init(&config.logging, args.verbose)
        .context("failed to initialize logging")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    match args.command {
        Command::Record { mood } => runtime.block_on(cmd_record(&config, &mood)),
        Command::Sync => runtime.block_on(cmd_sync(&config)),
        Command::Status => cmd_status(&config),
        Command::List => cmd_list(&config),
        Command::Moods => cmd_moods(&config),
    }
}

async fn cmd_record(config: &Config, mood: &str) -> Result<()> {
    let Some(category) = resolve_mood(mood, &config.moods) else {
        bail!(
            "unknown mood {:?}; run 'moodlog moods' to see the choices",
            mood
        );
    };

    let recorder = Recorder::from_config(config)
        .context("failed to set up recorder")?
        .with_status(ConsoleStatus);

    let report = recorder
        .record(category)
        .await
        .context("failed to record mood")?;

    println!(
        "Saved: {} {} {}",
        report.record.date(),
        report.record.time(),
        report.record.category()
    );
    print_sync_status(&report.sync);

    Ok(())
}

async fn cmd_sync(config: &Config) -> Result<()> {
    let recorder = Recorder::from_config(config)
        .context("failed to set up recorder")?
        .with_status(ConsoleStatus);

    let status = recorder.sync().await;
    print_sync_status(&status);

    match status {
        SyncStatus::Skipped(SkipReason::InvalidEndpoint(reason)) => {
            bail!("invalid endpoint configuration: {}", reason)
        }
        SyncStatus::Failed(e) => Err(e).context("sync failed"),
        SyncStatus::Completed(SyncResult {
            aborted: Some(e), ..
        }) => bail!("sync aborted: {}", e),
        _ => Ok(()),
    }
}

fn print_sync_status(status: &SyncStatus) {
    match status {
        SyncStatus::Skipped(SkipReason::NoEndpoint) => {
            println!("Sync: skipped (no endpoint configured)");
        }
        SyncStatus::Skipped(SkipReason::InvalidEndpoint(reason)) => {
            println!("Sync: skipped (invalid endpoint: {})", reason);
        }
        SyncStatus::Skipped(SkipReason::Offline) => {
            println!("Sync: skipped (offline)");
        }
        SyncStatus::Completed(result) if result.attempted == 0 => {
            println!("Sync: nothing to upload");
        }
        SyncStatus::Completed(result) => {
            println!(
                "Sync: {}/{} accepted, {} rejected{}",
                result.accepted,
                result.attempted,
                result.rejected,
                if result.cleared { ", queue cleared" } else { "" }
            );
            if let Some(e) = &result.aborted {
                println!("      aborted: {}", e);
            }
        }
        SyncStatus::Failed(e) => {
            println!("Sync: failed ({})", e);
        }
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    let queue = DurableQueue::from_config(&config.queue);
    let pending = queue.len().context("failed to read queue")?;

    println!("moodlog status");
    println!("==============");
    println!();
    println!("Queue:           {}", queue.path().display());
    println!("Pending:         {}", pending);
    println!(
        "Max Records:     {}",
        config
            .queue
            .max_records
            .map(|n| n.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    );
    println!(
        "Endpoint:        {}",
        config.endpoint.url.as_deref().unwrap_or("<not set>")
    );
    println!("Success Marker:  {}", config.endpoint.success_marker);
    println!("Timeout:         {}s", config.endpoint.timeout_secs);
    println!("Connectivity:    {:?}", config.connectivity.mode);
    println!(
        "Log File:        {}",
        moodlog_core::logging::log_file_path().display()
    );

    Ok(())
}

fn cmd_list(config: &Config) -> Result<()> {
    let queue = DurableQueue::from_config(&config.queue);
    let records = queue.read_all().context("failed to read queue")?;

    if records.is_empty() {
        println!("No queued records.");
        return Ok(());
    }

    println!("{:<12} {:<10} Mood", "Date", "Time");
    println!("{:-<40}", "");
    for record in &records {
        println!(
            "{:<12} {:<10} {}",
            record.date(),
            record.time(),
            record.category()
        );
    }
    println!();
    println!("{} record(s) waiting to sync", records.len());

    Ok(())
}

fn cmd_moods(config: &Config) -> Result<()> {
    for (index, mood) in config.moods.iter().enumerate() {
        println!("{}. {}", index + 1, mood);
    }
    Ok(())
}

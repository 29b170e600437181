//! floe-sync - mirrors catalog notifications into Snowflake.
//!
//! Reads one JSON `CatalogNotification` per line from a file or stdin,
//! submits each, and drains the scheduler before exiting. Ctrl-C cancels
//! retry waits and discards queued commands.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use floe_core::{CatalogNotification, LogFormat, init_logging};
use floe_sync::config::SyncConfig;
use floe_sync::service::{Submission, SyncService};
use floe_sync::warehouse::snowflake::SnowflakeWarehouse;

/// Mirror catalog table events into a Snowflake warehouse.
#[derive(Debug, Parser)]
#[command(name = "floe-sync", version, about)]
struct Cli {
    /// Newline-delimited JSON notifications to read (defaults to stdin).
    #[arg(long, short)]
    input: Option<PathBuf>,

    /// Log output format (pretty or json).
    #[arg(long, env = "FLOE_LOG_FORMAT")]
    log_format: Option<String>,
}

#[derive(Debug, Default)]
struct Tally {
    enqueued: usize,
    executed: usize,
    skipped: usize,
    malformed: usize,
    failed: usize,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SyncConfig::from_env().context("load configuration")?;

    let log_format = match cli.log_format.as_deref() {
        Some(format) => format.parse::<LogFormat>()?,
        None => config.log_format,
    };
    init_logging(log_format);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run(cli, config))
}

async fn run(cli: Cli, config: SyncConfig) -> Result<()> {
    let snowflake = config.require_snowflake()?.clone();
    let warehouse = SnowflakeWarehouse::new(snowflake)?;
    let service = SyncService::new(&config, Arc::new(warehouse))?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("open {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;
    let mut tally = Tally::default();
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    loop {
        let line = tokio::select! {
            _ = &mut ctrl_c => {
                tracing::warn!("interrupted, cancelling outstanding work");
                service.cancel();
                cancelled = true;
                break;
            }
            line = lines.next_line() => line.context("read notification")?,
        };
        let Some(line) = line else { break };
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let notification = match CatalogNotification::from_json(&line) {
            Ok(notification) => notification,
            Err(err) => {
                tracing::warn!(line = line_no, error = %err, "skipping malformed notification");
                tally.malformed += 1;
                continue;
            }
        };

        let interrupt = async {
            let _ = (&mut ctrl_c).await;
        };
        match service.submit_or_cancel(&notification, interrupt).await {
            Ok(Submission::Enqueued(_)) => tally.enqueued += 1,
            Ok(Submission::Executed(_)) => tally.executed += 1,
            Ok(Submission::Skipped(_)) => tally.skipped += 1,
            Err(err) => {
                tracing::error!(line = line_no, error = %err, "notification failed");
                tally.failed += 1;
            }
        }
        if service.is_cancelled() {
            cancelled = true;
            break;
        }
    }

    if cancelled {
        if let Some(scheduler) = service.scheduler() {
            scheduler.wait_idle().await;
        }
    } else {
        tokio::select! {
            () = service.shutdown() => {}
            _ = &mut ctrl_c => {
                tracing::warn!("interrupted during shutdown, cancelling outstanding work");
                service.cancel();
                if let Some(scheduler) = service.scheduler() {
                    scheduler.wait_idle().await;
                }
            }
        }
    }

    tracing::info!(
        enqueued = tally.enqueued,
        executed = tally.executed,
        skipped = tally.skipped,
        malformed = tally.malformed,
        failed = tally.failed,
        "finished"
    );

    if service.is_synchronous() && tally.failed > 0 {
        bail!("{} notification(s) failed", tally.failed);
    }
    Ok(())
}

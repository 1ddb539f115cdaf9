//! Run command - daily scheduled polling until Ctrl-C.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use ovolink_sync::OvoService;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use super::service_config;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Arguments for run command.
#[derive(Args, Default)]
pub struct RunArgs {
    /// Poll once immediately instead of waiting for the scheduled hour.
    #[arg(long)]
    pub now: bool,
}

/// Runs the daemon.
///
/// A newline on stdin requests an out-of-band refresh.
pub async fn run(args: &RunArgs, cli: &Cli) -> Result<()> {
    let service = Arc::new(OvoService::setup(&service_config(cli)).await?);
    let scheduler = service.scheduler()?;

    let (manual_tx, manual_rx) = mpsc::channel(4);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut updates = service.usage().subscribe();

    let scheduler_task = tokio::spawn(scheduler.run(service.clone(), manual_rx, shutdown_rx));
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(_)) = lines.next_line().await {
            if manual_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    if args.now {
        let initial = service.request_immediate_refresh();
        tokio::spawn(async move {
            if let Ok(Err(e)) = initial.await {
                warn!(error = %e, "Initial poll failed");
            }
        });
    }

    info!(account = %service.account_id(), "Running; press Enter to refresh, Ctrl-C to stop");
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_printed: Option<DateTime<Utc>> = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, shutting down");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(result) = service.usage().latest().await {
                    if last_printed != Some(result.fetched_at) && !cli.quiet {
                        let output = match cli.format {
                            OutputFormat::Json => JsonFormatter::new(cli.pretty).format_result(&result)?,
                            OutputFormat::Text => TextFormatter::new(!cli.no_color).format_result(&result),
                        };
                        println!("{output}");
                    }
                    last_printed = Some(result.fetched_at);
                }
            }
        }
    }

    // The scheduler may already be gone if its channel closed.
    let _ = shutdown_tx.send(true);
    stdin_task.abort();
    scheduler_task.await?;
    Ok(())
}

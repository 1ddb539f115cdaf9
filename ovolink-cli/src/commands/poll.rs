//! Poll command - one cycle, then print the result.

use anyhow::Result;
use ovolink_sync::OvoService;
use tracing::info;

use super::service_config;
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs the poll command.
pub async fn run(cli: &Cli) -> Result<()> {
    let service = OvoService::setup(&service_config(cli)).await?;
    info!(account = %service.account_id(), "Polling");
    let result = service.poll_once().await?;

    if cli.quiet {
        return Ok(());
    }
    let output = match cli.format {
        OutputFormat::Json => JsonFormatter::new(cli.pretty).format_result(&result)?,
        OutputFormat::Text => TextFormatter::new(!cli.no_color).format_result(&result),
    };
    println!("{output}");
    Ok(())
}

//! Accounts command - lists the customer's accounts.

use anyhow::Result;
use ovolink_store::SettingsStore;

use super::{config_dir, service_config};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs the accounts command.
pub async fn run(cli: &Cli) -> Result<()> {
    let settings = SettingsStore::load_from_dir(&config_dir(cli)).await.get().await;
    let session = service_config(cli)
        .open_session(settings.username.as_deref())
        .await?;
    let accounts = session.api.contact_info().await?;

    let output = match cli.format {
        OutputFormat::Json => JsonFormatter::new(cli.pretty).format_accounts(&accounts)?,
        OutputFormat::Text => TextFormatter::new(!cli.no_color).format_accounts(&accounts),
    };
    println!("{output}");
    Ok(())
}

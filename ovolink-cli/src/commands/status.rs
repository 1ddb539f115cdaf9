//! Status command - local session and schedule state, no network.

use anyhow::Result;
use chrono::Utc;
use ovolink_store::{SettingsStore, SqliteStatisticsStore};
use ovolink_sync::next_fire;

use super::{config_dir, service_config};
use crate::output::{JsonFormatter, StatusReport, TextFormatter};
use crate::{Cli, OutputFormat};

/// Runs the status command.
pub async fn run(cli: &Cli) -> Result<()> {
    let dir = config_dir(cli);
    let settings = SettingsStore::load_from_dir(&dir).await.get().await;
    let blob = service_config(cli).credential_file().load().await?;

    let mut statistics = Vec::new();
    let db_path = settings.statistics_db_path(&dir);
    if db_path.exists() {
        let store = SqliteStatisticsStore::open(&db_path)?;
        for id in store.statistic_ids().await? {
            let points = store.points(&id).await?.len();
            statistics.push((id, points));
        }
    }

    let report = StatusReport {
        config_dir: dir.display().to_string(),
        account_id: settings
            .account_id
            .clone()
            .or_else(|| blob.as_ref().and_then(|b| b.account_id.clone())),
        has_credentials: blob.is_some(),
        expires_at: blob.as_ref().map(|b| b.credentials.expires_at),
        has_refresh_token: blob
            .as_ref()
            .is_some_and(|b| b.credentials.has_refresh_token()),
        update_hour: settings.update_hour,
        timezone: settings.timezone.clone(),
        next_poll: settings
            .tz()
            .ok()
            .map(|tz| next_fire(Utc::now(), settings.update_hour, tz)),
        statistics,
    };

    let output = match cli.format {
        OutputFormat::Json => JsonFormatter::new(cli.pretty).format_status(&report)?,
        OutputFormat::Text => TextFormatter::new(!cli.no_color).format_status(&report),
    };
    println!("{output}");
    Ok(())
}

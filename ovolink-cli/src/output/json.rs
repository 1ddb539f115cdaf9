//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use ovolink_core::{Account, AggregatedSnapshot, HourlySeries, HourlySeriesKind, PollResult, UsagePeriodEntry};
use serde::{Serialize, Serializer};

use super::{StatusReport, RECENT_ENTRIES};

// ============================================================================
// Output Types
// ============================================================================

/// JSON output for one poll.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollOutput {
    pub account_id: String,
    #[serde(serialize_with = "serialize_datetime")]
    pub fetched_at: DateTime<Utc>,
    pub daily: SnapshotOutput,
    pub monthly: SnapshotOutput,
    pub yearly: SnapshotOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hourly: Option<Vec<SeriesOutput>>,
}

/// One aggregated snapshot.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotOutput {
    pub solar_consumption: f64,
    pub solar_charge: f64,
    pub grid_consumption: f64,
    pub grid_charge: f64,
    pub return_to_grid: f64,
    pub return_to_grid_charge: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_from: Option<String>,
}

/// One hourly series with its most recent entries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesOutput {
    pub series: &'static str,
    pub count: usize,
    pub total: f64,
    pub recent: Vec<EntryOutput>,
}

/// One hourly entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryOutput {
    pub period_from: String,
    pub consumption: f64,
}

/// One account.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_solar: Option<bool>,
    pub active: bool,
}

/// Local state.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusOutput {
    pub config_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    pub has_credentials: bool,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_datetime_opt")]
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
    pub update_hour: u32,
    pub timezone: String,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_datetime_opt")]
    pub next_poll: Option<DateTime<Utc>>,
    pub statistics: Vec<StatisticOutput>,
}

/// Point count of one statistic.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticOutput {
    pub statistic_id: String,
    pub points: usize,
}

// ============================================================================
// Conversions
// ============================================================================

impl From<&AggregatedSnapshot> for SnapshotOutput {
    fn from(snapshot: &AggregatedSnapshot) -> Self {
        Self {
            solar_consumption: snapshot.solar_consumption,
            solar_charge: snapshot.solar_charge,
            grid_consumption: snapshot.grid_consumption,
            grid_charge: snapshot.grid_charge,
            return_to_grid: snapshot.return_to_grid,
            return_to_grid_charge: snapshot.return_to_grid_charge,
            period_from: snapshot
                .latest_solar_entry
                .as_ref()
                .or(snapshot.latest_grid_entry.as_ref())
                .map(|e| e.period_from.clone()),
        }
    }
}

impl From<&UsagePeriodEntry> for EntryOutput {
    fn from(entry: &UsagePeriodEntry) -> Self {
        Self {
            period_from: entry.period_from.clone(),
            consumption: entry.consumption,
        }
    }
}

fn series_output(hourly: &HourlySeries) -> Vec<SeriesOutput> {
    HourlySeriesKind::ALL
        .iter()
        .map(|&kind| SeriesOutput {
            series: kind.key(),
            count: hourly.count(kind),
            total: hourly.total(kind),
            recent: hourly
                .recent(kind, RECENT_ENTRIES)
                .iter()
                .map(EntryOutput::from)
                .collect(),
        })
        .collect()
}

impl From<&PollResult> for PollOutput {
    fn from(result: &PollResult) -> Self {
        Self {
            account_id: result.account_id.to_string(),
            fetched_at: result.fetched_at,
            daily: (&result.daily).into(),
            monthly: (&result.monthly).into(),
            yearly: (&result.yearly).into(),
            hourly: result.hourly.as_ref().map(series_output),
        }
    }
}

impl From<&Account> for AccountOutput {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            number: account.number.clone(),
            customer_id: account.customer_id.clone(),
            system: account.system.clone(),
            has_solar: account.has_solar,
            active: account.is_active(),
        }
    }
}

impl From<&StatusReport> for StatusOutput {
    fn from(report: &StatusReport) -> Self {
        Self {
            config_dir: report.config_dir.clone(),
            account_id: report.account_id.as_ref().map(ToString::to_string),
            has_credentials: report.has_credentials,
            expires_at: report.expires_at,
            has_refresh_token: report.has_refresh_token,
            update_hour: report.update_hour,
            timezone: report.timezone.clone(),
            next_poll: report.next_poll,
            statistics: report
                .statistics
                .iter()
                .map(|(id, points)| StatisticOutput {
                    statistic_id: id.clone(),
                    points: *points,
                })
                .collect(),
        }
    }
}

// ============================================================================
// Serialization helpers
// ============================================================================

fn serialize_datetime<S>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.serialize_str(&dt.to_rfc3339())
}

#[allow(clippy::ref_option)]
fn serialize_datetime_opt<S>(dt: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match dt {
        Some(dt) => s.serialize_str(&dt.to_rfc3339()),
        None => s.serialize_none(),
    }
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }

    /// Formats one poll result.
    pub fn format_result(&self, result: &PollResult) -> Result<String> {
        self.format(&PollOutput::from(result))
    }

    /// Formats the account list.
    pub fn format_accounts(&self, accounts: &[Account]) -> Result<String> {
        let outputs: Vec<AccountOutput> = accounts.iter().map(AccountOutput::from).collect();
        self.format(&outputs)
    }

    /// Formats local state.
    pub fn format_status(&self, report: &StatusReport) -> Result<String> {
        self.format(&StatusOutput::from(report))
    }

    /// Formats an error object.
    pub fn format_error(&self, error: &str) -> Result<String> {
        self.format(&serde_json::json!({ "error": error }))
    }
}

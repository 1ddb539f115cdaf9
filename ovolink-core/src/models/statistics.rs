//! Cumulative statistics rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::snapshot::HourlySeriesKind;

/// Prefix of every statistic id written by ovolink.
pub const STATISTIC_SOURCE: &str = "ovolink";

/// One hourly statistics row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticPoint {
    /// Start of the hour as an absolute instant.
    pub start: DateTime<Utc>,
    /// Consumption in this hour.
    pub state: f64,
    /// Cumulative sum up to and including this hour.
    pub sum: f64,
}

/// Describes a statistic series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticMetadata {
    /// Unique id, `ovolink:<account>_<series key>`.
    pub statistic_id: String,
    /// Display name.
    pub name: String,
    /// Unit of measurement.
    pub unit: String,
    /// Whether rows carry a cumulative sum.
    pub has_sum: bool,
}

impl StatisticMetadata {
    /// Metadata for one hourly series of an account.
    pub fn hourly(account: &AccountId, kind: HourlySeriesKind) -> Self {
        Self {
            statistic_id: format!("{STATISTIC_SOURCE}:{account}_{}", kind.key()),
            name: kind.display_name().to_string(),
            unit: "kWh".to_string(),
            has_sum: true,
        }
    }
}

/// The cumulative total to continue from.
///
/// Always read from the store right before a merge, never cached.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RunningSumCheckpoint {
    /// Sum of the last point before the batch, or zero.
    pub last_known_sum: f64,
}

impl RunningSumCheckpoint {
    /// Creates a checkpoint.
    pub fn new(last_known_sum: f64) -> Self {
        Self { last_known_sum }
    }
}

impl From<Option<f64>> for RunningSumCheckpoint {
    fn from(sum: Option<f64>) -> Self {
        Self::new(sum.unwrap_or(0.0))
    }
}

//! Derived views produced by one poll cycle.
//!
//! All of these are rebuilt in full on every poll and handed to consumers
//! as values; nothing here is mutated incrementally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::usage::UsagePeriodEntry;

// ============================================================================
// Granularity
// ============================================================================

/// Aggregation window of the usage data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One bucket per day.
    Daily,
    /// One bucket per month.
    Monthly,
    /// One bucket per year.
    Yearly,
    /// One bucket per hour.
    Hourly,
}

impl Granularity {
    /// The three snapshot granularities, in display order.
    pub const SNAPSHOTS: [Self; 3] = [Self::Daily, Self::Monthly, Self::Yearly];

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Hourly => "hourly",
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Aggregated Snapshot
// ============================================================================

/// "Latest" record for one granularity.
///
/// At most one of `grid_*` / `return_to_grid*` is non-zero, depending on
/// the charge type of the latest export entry.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedSnapshot {
    /// Solar consumption of the latest solar entry (kWh).
    pub solar_consumption: f64,
    /// Solar charge of the latest solar entry.
    pub solar_charge: f64,
    /// Grid draw of the latest export entry (kWh).
    pub grid_consumption: f64,
    /// Charge of the latest grid-draw entry.
    pub grid_charge: f64,
    /// Energy returned to the grid by the latest export entry (kWh).
    pub return_to_grid: f64,
    /// Credit for the latest return-to-grid entry.
    pub return_to_grid_charge: f64,
    /// The solar entry this snapshot was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_solar_entry: Option<UsagePeriodEntry>,
    /// The export entry this snapshot was built from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_grid_entry: Option<UsagePeriodEntry>,
}

impl AggregatedSnapshot {
    /// Returns true if neither array had an entry.
    pub fn is_empty(&self) -> bool {
        self.latest_solar_entry.is_none() && self.latest_grid_entry.is_none()
    }
}

// ============================================================================
// Hourly Series
// ============================================================================

/// One of the three hourly sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HourlySeriesKind {
    /// Solar entries.
    Solar,
    /// Non-CREDIT export entries.
    Grid,
    /// CREDIT export entries.
    ReturnToGrid,
}

impl HourlySeriesKind {
    /// All three kinds.
    pub const ALL: [Self; 3] = [Self::Solar, Self::Grid, Self::ReturnToGrid];

    /// Stable key used in statistic ids.
    pub fn key(self) -> &'static str {
        match self {
            Self::Solar => "hourly_solar_consumption",
            Self::Grid => "hourly_grid_consumption",
            Self::ReturnToGrid => "hourly_return_to_grid",
        }
    }

    /// Human-readable name.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Solar => "Hourly Solar Consumption",
            Self::Grid => "Hourly Grid Consumption",
            Self::ReturnToGrid => "Hourly Return to Grid",
        }
    }
}

/// Hourly solar, grid and return-to-grid sequences with batch totals.
///
/// Totals cover this batch only. Merging with previously imported history
/// is done separately against a freshly read checkpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HourlySeries {
    /// Every solar entry in the queried window.
    pub solar_entries: Vec<UsagePeriodEntry>,
    /// Every non-CREDIT export entry.
    pub grid_entries: Vec<UsagePeriodEntry>,
    /// Every CREDIT export entry.
    pub return_to_grid_entries: Vec<UsagePeriodEntry>,
    /// Sum of solar consumption.
    pub solar_total: f64,
    /// Sum of grid consumption.
    pub grid_total: f64,
    /// Sum of return-to-grid consumption.
    pub return_to_grid_total: f64,
}

impl HourlySeries {
    /// Entries of one series.
    pub fn entries(&self, kind: HourlySeriesKind) -> &[UsagePeriodEntry] {
        match kind {
            HourlySeriesKind::Solar => &self.solar_entries,
            HourlySeriesKind::Grid => &self.grid_entries,
            HourlySeriesKind::ReturnToGrid => &self.return_to_grid_entries,
        }
    }

    /// Batch total of one series.
    pub fn total(&self, kind: HourlySeriesKind) -> f64 {
        match kind {
            HourlySeriesKind::Solar => self.solar_total,
            HourlySeriesKind::Grid => self.grid_total,
            HourlySeriesKind::ReturnToGrid => self.return_to_grid_total,
        }
    }

    /// Number of entries in one series.
    pub fn count(&self, kind: HourlySeriesKind) -> usize {
        self.entries(kind).len()
    }

    /// The last `n` entries of one series.
    pub fn recent(&self, kind: HourlySeriesKind, n: usize) -> &[UsagePeriodEntry] {
        let entries = self.entries(kind);
        &entries[entries.len().saturating_sub(n)..]
    }

    /// Returns true if all three series are empty.
    pub fn is_empty(&self) -> bool {
        HourlySeriesKind::ALL.iter().all(|k| self.entries(*k).is_empty())
    }
}

// ============================================================================
// Poll Result
// ============================================================================

/// Everything one successful poll cycle produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    /// Account the data belongs to.
    pub account_id: AccountId,
    /// Daily snapshot.
    pub daily: AggregatedSnapshot,
    /// Monthly snapshot.
    pub monthly: AggregatedSnapshot,
    /// Yearly snapshot.
    pub yearly: AggregatedSnapshot,
    /// Hourly series; `None` when the hourly fetch failed this cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly: Option<HourlySeries>,
    /// When the cycle completed.
    pub fetched_at: DateTime<Utc>,
}

impl PollResult {
    /// Snapshot for a granularity (`None` for hourly).
    pub fn snapshot(&self, granularity: Granularity) -> Option<&AggregatedSnapshot> {
        match granularity {
            Granularity::Daily => Some(&self.daily),
            Granularity::Monthly => Some(&self.monthly),
            Granularity::Yearly => Some(&self.yearly),
            Granularity::Hourly => None,
        }
    }
}

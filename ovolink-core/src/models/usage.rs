//! Raw usage types as returned by the data API.
//!
//! This module contains the wire-level shapes of `GetIntervalData` and
//! `GetHourlyData`:
//! - [`UsagePeriodEntry`] - One bucket of consumption with its charge
//! - [`ChargeType`] - Tariff classification (CREDIT = exported energy)
//! - [`UsageData`] - Solar and export arrays for one window
//! - [`IntervalData`] - Daily, monthly and yearly [`UsageData`]
//!
//! Entries are read-only to the rest of the system. Missing or `null`
//! numeric fields decode as zero rather than failing.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};

/// Decodes `null` as the type's default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Charge
// ============================================================================

/// Tariff classification of a usage entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeType {
    /// Energy bought from the grid.
    #[default]
    Debit,
    /// Energy exported and credited back to the account.
    Credit,
    /// Free-period consumption.
    Free,
    /// Peak-rate consumption.
    Peak,
    /// Off-peak consumption.
    OffPeak,
    /// Any classification this version does not know about.
    #[serde(other)]
    Other,
}

impl ChargeType {
    /// Returns true if this entry is energy returned to the grid.
    ///
    /// Only `CREDIT` counts; every other type (known or not) is grid draw.
    pub fn is_return_to_grid(self) -> bool {
        matches!(self, Self::Credit)
    }
}

/// Monetary charge attached to a usage entry.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Charge {
    /// Charge amount in dollars.
    #[serde(default, deserialize_with = "null_as_default")]
    pub value: f64,
    /// Tariff classification.
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub charge_type: ChargeType,
}

// ============================================================================
// Usage Period Entry
// ============================================================================

/// One time bucket of usage.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsagePeriodEntry {
    /// Start of the bucket as sent by the API.
    #[serde(default, alias = "period_from")]
    pub period_from: String,
    /// End of the bucket as sent by the API.
    #[serde(default, alias = "period_to")]
    pub period_to: String,
    /// Energy in kWh; missing or `null` becomes zero.
    #[serde(default, deserialize_with = "null_as_default")]
    pub consumption: f64,
    /// Meter read type (e.g. `ACTUAL`, `ESTIMATE`).
    #[serde(default, alias = "read_type", skip_serializing_if = "Option::is_none")]
    pub read_type: Option<String>,
    /// Attached charge.
    #[serde(default, deserialize_with = "null_as_default")]
    pub charge: Charge,
}

impl UsagePeriodEntry {
    /// Creates an entry with the given start, consumption and charge.
    pub fn new(
        period_from: impl Into<String>,
        consumption: f64,
        charge_value: f64,
        charge_type: ChargeType,
    ) -> Self {
        Self {
            period_from: period_from.into(),
            period_to: String::new(),
            consumption,
            read_type: None,
            charge: Charge {
                value: charge_value,
                charge_type,
            },
        }
    }

    /// Charge classification of this entry.
    pub fn charge_type(&self) -> ChargeType {
        self.charge.charge_type
    }

    /// Charge amount of this entry.
    pub fn charge_value(&self) -> f64 {
        self.charge.value
    }

    /// Start of the bucket as a wall-clock time with any zone marker dropped.
    ///
    /// The API labels its timestamps as UTC but they are local wall-clock
    /// times, so the offset is discarded rather than applied.
    pub fn period_start(&self) -> Option<NaiveDateTime> {
        parse_wall_clock(&self.period_from)
    }

    /// End of the bucket, parsed like [`Self::period_start`].
    pub fn period_end(&self) -> Option<NaiveDateTime> {
        parse_wall_clock(&self.period_to)
    }
}

/// Parses an API timestamp into a naive wall-clock time.
///
/// Accepts RFC 3339 (`2024-03-01T13:00:00Z`, `...+10:00`), naive ISO
/// (`2024-03-01T13:00:00`, with or without fractional seconds, `T` or
/// space separated) and bare dates (midnight).
pub fn parse_wall_clock(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ============================================================================
// Usage Data
// ============================================================================

/// Solar and export arrays for one window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UsageData {
    /// Solar generation/consumption entries, oldest first.
    #[serde(default, deserialize_with = "null_as_default")]
    pub solar: Vec<UsagePeriodEntry>,
    /// Grid import/export entries, oldest first.
    #[serde(default, deserialize_with = "null_as_default")]
    pub export: Vec<UsagePeriodEntry>,
}

impl UsageData {
    /// Returns true if both arrays are empty.
    pub fn is_empty(&self) -> bool {
        self.solar.is_empty() && self.export.is_empty()
    }
}

/// Three-granularity result of `GetIntervalData`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IntervalData {
    /// Daily buckets.
    #[serde(default, deserialize_with = "null_as_default")]
    pub daily: UsageData,
    /// Monthly buckets.
    #[serde(default, deserialize_with = "null_as_default")]
    pub monthly: UsageData,
    /// Yearly buckets.
    #[serde(default, deserialize_with = "null_as_default")]
    pub yearly: UsageData,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_parse_wall_clock_strips_zone() {
        assert_eq!(parse_wall_clock("2024-03-01T13:00:00Z"), Some(at(2024, 3, 1, 13)));
        assert_eq!(
            parse_wall_clock("2024-03-01T13:00:00+10:00"),
            Some(at(2024, 3, 1, 13))
        );
        assert_eq!(parse_wall_clock("2024-03-01T13:00:00"), Some(at(2024, 3, 1, 13)));
        assert_eq!(
            parse_wall_clock("2024-03-01T13:00:00.000"),
            Some(at(2024, 3, 1, 13))
        );
        assert_eq!(parse_wall_clock("2024-03-01"), Some(at(2024, 3, 1, 0)));
    }

    #[test]
    fn test_parse_wall_clock_rejects_garbage() {
        assert_eq!(parse_wall_clock(""), None);
        assert_eq!(parse_wall_clock("yesterday"), None);
    }

    #[test]
    fn test_return_to_grid_classification() {
        assert!(ChargeType::Credit.is_return_to_grid());
        for t in [
            ChargeType::Debit,
            ChargeType::Free,
            ChargeType::Peak,
            ChargeType::OffPeak,
            ChargeType::Other,
        ] {
            assert!(!t.is_return_to_grid());
        }
    }
}

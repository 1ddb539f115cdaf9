//! Reduces raw usage arrays into snapshots and hourly series.
//!
//! Interval arrays carry history, but only the final element of each array
//! is current. Hourly arrays are kept whole because they feed a time series.
//!
//! Export entries are routed by charge type: `CREDIT` is energy returned to
//! the grid, everything else is grid draw.

use ovolink_core::{AggregatedSnapshot, HourlySeries, IntervalData, UsageData, UsagePeriodEntry};

/// Builds the snapshot of one granularity from the last entry of each array.
pub fn reduce_usage(data: &UsageData) -> AggregatedSnapshot {
    let mut snapshot = AggregatedSnapshot::default();

    if let Some(solar) = data.solar.last() {
        snapshot.solar_consumption = solar.consumption;
        snapshot.solar_charge = solar.charge_value();
        snapshot.latest_solar_entry = Some(solar.clone());
    }

    if let Some(export) = data.export.last() {
        if export.charge_type().is_return_to_grid() {
            snapshot.return_to_grid = export.consumption;
            snapshot.return_to_grid_charge = export.charge_value();
        } else {
            snapshot.grid_consumption = export.consumption;
            snapshot.grid_charge = export.charge_value();
        }
        snapshot.latest_grid_entry = Some(export.clone());
    }

    snapshot
}

/// Reduces all three granularities, returning `(daily, monthly, yearly)`.
pub fn reduce_interval(
    data: &IntervalData,
) -> (AggregatedSnapshot, AggregatedSnapshot, AggregatedSnapshot) {
    (
        reduce_usage(&data.daily),
        reduce_usage(&data.monthly),
        reduce_usage(&data.yearly),
    )
}

fn total(entries: &[UsagePeriodEntry]) -> f64 {
    entries.iter().map(|e| e.consumption).sum()
}

/// Splits an hourly batch into solar, grid and return-to-grid series.
///
/// Totals cover this batch only.
pub fn reduce_hourly(data: &UsageData) -> HourlySeries {
    let (return_to_grid_entries, grid_entries): (Vec<_>, Vec<_>) = data
        .export
        .iter()
        .cloned()
        .partition(|e| e.charge_type().is_return_to_grid());

    HourlySeries {
        solar_total: total(&data.solar),
        grid_total: total(&grid_entries),
        return_to_grid_total: total(&return_to_grid_entries),
        solar_entries: data.solar.clone(),
        grid_entries,
        return_to_grid_entries,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ovolink_core::{ChargeType, HourlySeriesKind};

    fn entry(from: &str, consumption: f64, value: f64, charge_type: ChargeType) -> UsagePeriodEntry {
        UsagePeriodEntry::new(from, consumption, value, charge_type)
    }

    #[test]
    fn test_only_last_entry_counts() {
        let data = UsageData {
            solar: vec![],
            export: vec![
                entry("2024-03-01", 5.0, 1.0, ChargeType::Debit),
                entry("2024-03-02", 8.0, 2.0, ChargeType::Credit),
            ],
        };

        let snapshot = reduce_usage(&data);
        assert!((snapshot.return_to_grid - 8.0).abs() < f64::EPSILON);
        assert!((snapshot.return_to_grid_charge - 2.0).abs() < f64::EPSILON);
        assert!(snapshot.grid_consumption.abs() < f64::EPSILON);
        assert!(snapshot.grid_charge.abs() < f64::EPSILON);
        assert_eq!(
            snapshot.latest_grid_entry.as_ref().map(|e| e.period_from.as_str()),
            Some("2024-03-02")
        );
        assert!(snapshot.latest_solar_entry.is_none());
    }

    #[test]
    fn test_non_credit_types_are_grid_draw() {
        for charge_type in [ChargeType::Debit, ChargeType::Free, ChargeType::Peak, ChargeType::OffPeak, ChargeType::Other] {
            let data = UsageData {
                solar: vec![entry("2024-03-01", 3.0, 0.4, ChargeType::Debit)],
                export: vec![entry("2024-03-01", 6.5, 1.5, charge_type)],
            };
            let snapshot = reduce_usage(&data);
            assert!((snapshot.grid_consumption - 6.5).abs() < f64::EPSILON);
            assert!((snapshot.grid_charge - 1.5).abs() < f64::EPSILON);
            assert!(snapshot.return_to_grid.abs() < f64::EPSILON);
            assert!((snapshot.solar_consumption - 3.0).abs() < f64::EPSILON);
            assert!((snapshot.solar_charge - 0.4).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn test_empty_arrays_give_empty_snapshot() {
        let (daily, monthly, yearly) = reduce_interval(&IntervalData::default());
        assert!(daily.is_empty());
        assert!(monthly.is_empty());
        assert!(yearly.is_empty());
        assert_eq!(daily, AggregatedSnapshot::default());
    }

    #[test]
    fn test_hourly_keeps_every_entry() {
        let data = UsageData {
            solar: vec![
                entry("2024-03-01T00:00:00Z", 0.5, 0.0, ChargeType::Debit),
                entry("2024-03-01T01:00:00Z", 0.25, 0.0, ChargeType::Debit),
            ],
            export: vec![
                entry("2024-03-01T00:00:00Z", 1.0, 0.3, ChargeType::Debit),
                entry("2024-03-01T01:00:00Z", 2.0, 0.1, ChargeType::Credit),
                entry("2024-03-01T02:00:00Z", 4.0, 0.2, ChargeType::Peak),
            ],
        };

        let series = reduce_hourly(&data);
        assert_eq!(series.count(HourlySeriesKind::Solar), 2);
        assert_eq!(series.count(HourlySeriesKind::Grid), 2);
        assert_eq!(series.count(HourlySeriesKind::ReturnToGrid), 1);
        assert!((series.solar_total - 0.75).abs() < f64::EPSILON);
        assert!((series.grid_total - 5.0).abs() < f64::EPSILON);
        assert!((series.return_to_grid_total - 2.0).abs() < f64::EPSILON);
        assert_eq!(series.grid_entries[1].period_from, "2024-03-01T02:00:00Z");
    }
}

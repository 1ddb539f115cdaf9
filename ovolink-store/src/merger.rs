//! Merges hourly batches into cumulative statistics.
//!
//! The portal labels hourly timestamps as UTC but they are local wall-clock
//! times. Each timestamp has its zone marker dropped and the configured
//! zone attached; it is never converted.
//!
//! The running sum of a batch is seeded from the store, reading the latest
//! sum in the 24 hours before the batch's first hour. The seed is read
//! fresh for every import, so re-importing an overlapping window continues
//! from the stored history rather than from an in-memory total.

use std::sync::Arc;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use ovolink_core::{
    AccountId, CoreError, HourlySeries, HourlySeriesKind, RunningSumCheckpoint, StatisticMetadata,
    StatisticPoint, StatisticsStore, UsagePeriodEntry,
};
use tracing::{debug, error, info, instrument, warn};

/// Width of the window searched for the seed sum.
pub const LOOKBACK_HOURS: i64 = 24;

// ============================================================================
// Pure Merge
// ============================================================================

/// Attaches `tz` to a wall-clock time.
///
/// Returns `None` for times inside a DST gap. Ambiguous times (the repeated
/// hour when clocks go back) resolve to the earlier instant.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => {
            warn!(%naive, zone = %tz, "Skipping non-existent local time");
            None
        }
    }
}

/// Localizes entries and sorts them by start.
///
/// Entries whose timestamp cannot be parsed are skipped.
pub fn prepare(entries: &[UsagePeriodEntry], tz: Tz) -> Vec<(DateTime<Utc>, f64)> {
    let mut samples: Vec<(DateTime<Utc>, f64)> = entries
        .iter()
        .filter_map(|entry| {
            let Some(naive) = entry.period_start() else {
                error!(period_from = %entry.period_from, "Unparseable hourly timestamp");
                return None;
            };
            localize(naive, tz).map(|start| (start, entry.consumption))
        })
        .collect();
    samples.sort_by_key(|(start, _)| *start);
    samples
}

/// Accumulates sorted samples on top of `checkpoint`.
///
/// The emitted sums never decrease as long as consumption is non-negative.
pub fn accumulate(
    samples: &[(DateTime<Utc>, f64)],
    checkpoint: RunningSumCheckpoint,
) -> Vec<StatisticPoint> {
    let mut sum = checkpoint.last_known_sum;
    samples
        .iter()
        .map(|&(start, state)| {
            sum += state;
            StatisticPoint { start, state, sum }
        })
        .collect()
}

/// Seed window for a batch starting at `first`: `[first - 24h, first)`.
pub fn lookback_window(first: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    (first - Duration::hours(LOOKBACK_HOURS), first)
}

// ============================================================================
// Statistics Merger
// ============================================================================

/// Per-series outcome of an import.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesImport {
    /// Series written.
    pub kind: HourlySeriesKind,
    /// Points written.
    pub points: usize,
    /// Seed the sums continued from.
    pub seed: f64,
    /// Sum of the last point written.
    pub final_sum: f64,
}

/// Imports hourly series into a [`StatisticsStore`].
#[derive(Clone)]
pub struct StatisticsMerger {
    store: Arc<dyn StatisticsStore>,
    tz: Tz,
}

impl std::fmt::Debug for StatisticsMerger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatisticsMerger")
            .field("tz", &self.tz)
            .finish_non_exhaustive()
    }
}

impl StatisticsMerger {
    /// Creates a merger reading timestamps in `tz`.
    pub fn new(store: Arc<dyn StatisticsStore>, tz: Tz) -> Self {
        Self { store, tz }
    }

    /// Zone timestamps are read in.
    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Merges one series; `None` if it had no usable entries.
    ///
    /// # Errors
    ///
    /// Any store failure. Nothing is written when the seed lookup fails.
    #[instrument(skip(self, entries), fields(account = %account, series = kind.key(), count = entries.len()))]
    pub async fn import_series(
        &self,
        account: &AccountId,
        kind: HourlySeriesKind,
        entries: &[UsagePeriodEntry],
    ) -> Result<Option<SeriesImport>, CoreError> {
        let samples = prepare(entries, self.tz);
        let Some(&(first, _)) = samples.first() else {
            debug!("No hourly entries to import");
            return Ok(None);
        };

        let metadata = StatisticMetadata::hourly(account, kind);
        let (window_start, window_end) = lookback_window(first);
        let checkpoint = RunningSumCheckpoint::from(
            self.store
                .prior_sum(&metadata.statistic_id, window_start, window_end)
                .await?,
        );

        let points = accumulate(&samples, checkpoint);
        self.store.import(&metadata, &points).await?;

        let final_sum = points.last().map_or(checkpoint.last_known_sum, |p| p.sum);
        info!(
            statistic_id = %metadata.statistic_id,
            points = points.len(),
            seed = checkpoint.last_known_sum,
            final_sum,
            "Imported hourly statistics"
        );
        Ok(Some(SeriesImport {
            kind,
            points: points.len(),
            seed: checkpoint.last_known_sum,
            final_sum,
        }))
    }

    /// Merges all three series of a poll.
    ///
    /// # Errors
    ///
    /// The first store failure; series already written stay written.
    pub async fn import_hourly(
        &self,
        account: &AccountId,
        series: &HourlySeries,
    ) -> Result<Vec<SeriesImport>, CoreError> {
        let mut imported = Vec::new();
        for kind in HourlySeriesKind::ALL {
            if let Some(result) = self.import_series(account, kind, series.entries(kind)).await? {
                imported.push(result);
            }
        }
        Ok(imported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::SqliteStatisticsStore;
    use chrono::{NaiveDate, Timelike};
    use chrono_tz::Australia::Sydney;
    use ovolink_core::ChargeType;

    fn entry(from: &str, consumption: f64) -> UsagePeriodEntry {
        UsagePeriodEntry::new(from, consumption, 0.0, ChargeType::Debit)
    }

    fn naive(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn test_accumulate_seeds_from_checkpoint() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let t1 = t0 + Duration::hours(1);
        let samples = [(t0, 1.0), (t1, 2.0)];

        let sums: Vec<f64> = accumulate(&samples, RunningSumCheckpoint::new(10.0))
            .iter()
            .map(|p| p.sum)
            .collect();
        assert_eq!(sums, vec![11.0, 13.0]);

        let sums: Vec<f64> = accumulate(&samples, RunningSumCheckpoint::new(13.0))
            .iter()
            .map(|p| p.sum)
            .collect();
        assert_eq!(sums, vec![14.0, 16.0]);
    }

    #[test]
    fn test_utc_marker_is_replaced_not_converted() {
        let samples = prepare(&[entry("2024-06-01T13:00:00Z", 1.0)], Sydney);
        // 13:00 AEST is 03:00 UTC.
        assert_eq!(samples[0].0, Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn test_prepare_sorts_and_skips_bad_entries() {
        let samples = prepare(
            &[
                entry("2024-06-01T02:00:00Z", 2.0),
                entry("garbage", 9.0),
                entry("2024-06-01T01:00:00Z", 1.0),
            ],
            Sydney,
        );
        let states: Vec<f64> = samples.iter().map(|s| s.1).collect();
        assert_eq!(states, vec![1.0, 2.0]);
    }

    #[test]
    fn test_dst_transitions() {
        // Clocks spring forward at 02:00 on 2024-10-06 in Sydney.
        assert!(localize(naive(2024, 10, 6, 2), Sydney).is_none());

        // Clocks fall back at 03:00 on 2024-04-07; 02:00 occurs twice.
        let earliest = localize(naive(2024, 4, 7, 2), Sydney).unwrap();
        assert_eq!(earliest, Utc.with_ymd_and_hms(2024, 4, 6, 15, 0, 0).unwrap());
        assert_eq!(earliest.hour(), 15);
    }

    #[test]
    fn test_lookback_window() {
        let first = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let (start, end) = lookback_window(first);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
        assert_eq!(end, first);
    }

    #[tokio::test]
    async fn test_reimport_continues_from_stored_history() {
        let store = Arc::new(SqliteStatisticsStore::open_in_memory().unwrap());
        let merger = StatisticsMerger::new(store.clone(), Sydney);
        let account = AccountId::new("30001");

        let day1 = [entry("2024-06-01T00:00:00Z", 1.0), entry("2024-06-01T01:00:00Z", 2.0)];
        let first = merger
            .import_series(&account, HourlySeriesKind::Solar, &day1)
            .await
            .unwrap()
            .unwrap();
        assert!(first.seed.abs() < f64::EPSILON);
        assert!((first.final_sum - 3.0).abs() < f64::EPSILON);

        // Overlapping window: hour 01 again plus a new hour 02.
        let overlap = [entry("2024-06-01T01:00:00Z", 2.0), entry("2024-06-01T02:00:00Z", 4.0)];
        let second = merger
            .import_series(&account, HourlySeriesKind::Solar, &overlap)
            .await
            .unwrap()
            .unwrap();
        assert!((second.seed - 1.0).abs() < f64::EPSILON);
        assert!((second.final_sum - 7.0).abs() < f64::EPSILON);

        let id = StatisticMetadata::hourly(&account, HourlySeriesKind::Solar).statistic_id;
        let sums: Vec<f64> = store.points(&id).await.unwrap().iter().map(|p| p.sum).collect();
        assert_eq!(sums, vec![1.0, 3.0, 7.0]);
    }

    #[tokio::test]
    async fn test_import_hourly_skips_empty_series() {
        let store = Arc::new(SqliteStatisticsStore::open_in_memory().unwrap());
        let merger = StatisticsMerger::new(store.clone(), Sydney);
        let series = HourlySeries {
            solar_entries: vec![entry("2024-06-01T10:00:00Z", 0.5)],
            solar_total: 0.5,
            ..Default::default()
        };

        let imported = merger.import_hourly(&AccountId::new("1"), &series).await.unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].kind, HourlySeriesKind::Solar);
        assert_eq!(store.statistic_ids().await.unwrap().len(), 1);
    }
}

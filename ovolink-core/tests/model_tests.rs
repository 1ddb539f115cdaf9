//! Integration tests for core model types.

use chrono::{Duration, NaiveDate, Utc};
use ovolink_core::{
    AccountId, AggregatedSnapshot, CredentialSet, Granularity, HourlySeriesKind, PollResult,
    RunningSumCheckpoint, StatisticMetadata, UsagePeriodEntry, ChargeType,
};

#[test]
fn test_credentials_expire_five_minutes_early() {
    let now = Utc::now();
    let creds = CredentialSet::new("a", "i", None, now + Duration::hours(1));
    assert!(!creds.is_expired_at(now));
    assert!(creds.is_expired_at(now + Duration::minutes(55)));
}

#[test]
fn test_credentials_serialization_roundtrip() {
    let creds = CredentialSet::new("a", "i", Some("r".into()), Utc::now());
    let json = serde_json::to_string(&creds).unwrap();
    let parsed: CredentialSet = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, creds);
}

#[test]
fn test_statistic_ids() {
    let account = AccountId::new("12345");
    let meta = StatisticMetadata::hourly(&account, HourlySeriesKind::Solar);
    assert_eq!(meta.statistic_id, "ovolink:12345_hourly_solar_consumption");
    assert_eq!(meta.unit, "kWh");
    assert!(meta.has_sum);

    let meta = StatisticMetadata::hourly(&account, HourlySeriesKind::ReturnToGrid);
    assert_eq!(meta.statistic_id, "ovolink:12345_hourly_return_to_grid");
}

#[test]
fn test_checkpoint_from_missing_sum_is_zero() {
    let checkpoint = RunningSumCheckpoint::from(None);
    assert!(checkpoint.last_known_sum.abs() < f64::EPSILON);
    assert!((RunningSumCheckpoint::from(Some(4.5)).last_known_sum - 4.5).abs() < f64::EPSILON);
}

#[test]
fn test_entry_period_start_ignores_utc_marker() {
    let entry = UsagePeriodEntry::new("2024-06-01T02:00:00Z", 1.0, 0.1, ChargeType::Debit);
    let expected = NaiveDate::from_ymd_opt(2024, 6, 1)
        .unwrap()
        .and_hms_opt(2, 0, 0)
        .unwrap();
    assert_eq!(entry.period_start(), Some(expected));
}

#[test]
fn test_poll_result_snapshot_lookup() {
    let result = PollResult {
        account_id: AccountId::new("1"),
        daily: AggregatedSnapshot {
            solar_consumption: 1.0,
            ..Default::default()
        },
        monthly: AggregatedSnapshot::default(),
        yearly: AggregatedSnapshot::default(),
        hourly: None,
        fetched_at: Utc::now(),
    };
    let daily = result.snapshot(Granularity::Daily).unwrap();
    assert!((daily.solar_consumption - 1.0).abs() < f64::EPSILON);
    assert!(result.snapshot(Granularity::Hourly).is_none());
}

//! Cross-module tests: credential write-back through the auth guard's sink
//! interface and statistics import through the core trait.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use chrono_tz::Australia::Sydney;
use ovolink_core::{
    AccountId, ChargeType, CredentialSet, CredentialSink, HourlySeries, HourlySeriesKind,
    StatisticMetadata, StatisticsStore, UsagePeriodEntry,
};
use ovolink_store::{
    credentials_path, CredentialFile, Settings, SettingsStore, SqliteStatisticsStore,
    StatisticsMerger,
};
use tempfile::TempDir;

fn hourly(from: &str, consumption: f64, charge_type: ChargeType) -> UsagePeriodEntry {
    UsagePeriodEntry::new(from, consumption, 0.0, charge_type)
}

#[tokio::test]
async fn test_sink_trait_object_writes_blob() {
    let temp_dir = TempDir::new().unwrap();
    let file = Arc::new(CredentialFile::new(credentials_path(temp_dir.path())));
    let sink: Arc<dyn CredentialSink> = file.clone();

    let creds = CredentialSet::new("a", "i", Some("r".into()), Utc::now() + Duration::hours(1));
    sink.persist(&creds).await.unwrap();

    let blob = file.load().await.unwrap().unwrap();
    assert_eq!(blob.credentials.refresh_token.as_deref(), Some("r"));
}

#[tokio::test]
async fn test_three_series_imported_with_separate_sums() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings::default();
    let db = settings.statistics_db_path(temp_dir.path());
    let store = Arc::new(SqliteStatisticsStore::open(&db).unwrap());
    let merger = StatisticsMerger::new(store.clone(), settings.tz().unwrap());
    let account = AccountId::new("30001");

    let series = HourlySeries {
        solar_entries: vec![
            hourly("2024-03-01T10:00:00Z", 1.0, ChargeType::Debit),
            hourly("2024-03-01T11:00:00Z", 1.5, ChargeType::Debit),
        ],
        grid_entries: vec![hourly("2024-03-01T10:00:00Z", 0.2, ChargeType::Peak)],
        return_to_grid_entries: vec![hourly("2024-03-01T11:00:00Z", 0.7, ChargeType::Credit)],
        solar_total: 2.5,
        grid_total: 0.2,
        return_to_grid_total: 0.7,
    };

    let imported = merger.import_hourly(&account, &series).await.unwrap();
    assert_eq!(imported.len(), 3);

    let solar = StatisticMetadata::hourly(&account, HourlySeriesKind::Solar);
    assert_eq!(solar.statistic_id, "ovolink:30001_hourly_solar_consumption");

    // 11:00 AEDT on 2024-03-01 is 00:00 UTC.
    let eleven = Sydney.with_ymd_and_hms(2024, 3, 1, 11, 0, 0).unwrap().with_timezone(&Utc);
    assert_eq!(eleven, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    let sum = store
        .prior_sum(&solar.statistic_id, eleven - Duration::hours(1), eleven + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(sum, Some(2.5));

    let rtg = StatisticMetadata::hourly(&account, HourlySeriesKind::ReturnToGrid);
    let points = store.points(&rtg.statistic_id).await.unwrap();
    assert_eq!(points.len(), 1);
    assert!((points[0].sum - 0.7).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_settings_round_trip_through_dir() {
    let temp_dir = TempDir::new().unwrap();
    let store = SettingsStore::load_from_dir(temp_dir.path()).await;
    store.update(|s| s.account_id = Some(AccountId::new("99"))).await;
    store.save().await.unwrap();

    let reloaded = SettingsStore::load_from_dir(temp_dir.path()).await.get().await;
    assert_eq!(reloaded.account_id, Some(AccountId::new("99")));
}

//! Last published poll result.
//!
//! Holds the last good [`PollResult`] and notifies subscribers on change.
//! A failed cycle records its error but never replaces the last good
//! result.

use chrono::{DateTime, Utc};
use ovolink_core::{AggregatedSnapshot, Granularity, HourlySeries, PollResult};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing::{debug, warn};

use crate::error::StoreError;

// ============================================================================
// Inner State
// ============================================================================

#[derive(Debug, Default)]
struct UsageStoreInner {
    /// Last successful poll.
    result: Option<PollResult>,
    /// Error of the most recent failed poll.
    error: Option<String>,
    /// When the last poll finished, successful or not.
    last_refresh: Option<DateTime<Utc>>,
    /// Whether a poll is running.
    refresh_in_progress: bool,
}

// ============================================================================
// Usage Store
// ============================================================================

/// Observable store of the published usage state.
#[derive(Debug, Clone)]
pub struct UsageStore {
    inner: Arc<RwLock<UsageStoreInner>>,
    notify: Arc<watch::Sender<u64>>,
}

impl Default for UsageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            inner: Arc::new(RwLock::new(UsageStoreInner::default())),
            notify: Arc::new(notify),
        }
    }

    // ========================================================================
    // Results
    // ========================================================================

    /// The last good poll result.
    pub async fn latest(&self) -> Option<PollResult> {
        self.inner.read().await.result.clone()
    }

    /// Snapshot of one granularity from the last good poll.
    pub async fn snapshot(&self, granularity: Granularity) -> Option<AggregatedSnapshot> {
        self.inner
            .read()
            .await
            .result
            .as_ref()
            .and_then(|r| r.snapshot(granularity).cloned())
    }

    /// Hourly series from the last good poll.
    pub async fn hourly(&self) -> Option<HourlySeries> {
        self.inner
            .read()
            .await
            .result
            .as_ref()
            .and_then(|r| r.hourly.clone())
    }

    /// Publishes a successful poll and clears any error.
    ///
    /// A result without hourly data keeps the previous hourly series.
    pub async fn publish(&self, mut result: PollResult) {
        {
            let mut inner = self.inner.write().await;
            if result.hourly.is_none() {
                result.hourly = inner.result.as_mut().and_then(|r| r.hourly.take());
            }
            inner.last_refresh = Some(result.fetched_at);
            inner.result = Some(result);
            inner.error = None;
        }
        self.notify_change();
        debug!("Poll result published");
    }

    // ========================================================================
    // Refresh Management
    // ========================================================================

    /// Marks a poll as running.
    ///
    /// # Errors
    ///
    /// `StoreError::Config` if one is already running.
    pub async fn start_refresh(&self) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if inner.refresh_in_progress {
            return Err(StoreError::Config("refresh already in progress".to_string()));
        }
        inner.refresh_in_progress = true;
        Ok(())
    }

    /// Marks the running poll as done.
    pub async fn end_refresh(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.refresh_in_progress = false;
            inner.last_refresh = Some(Utc::now());
        }
        self.notify_change();
    }

    /// Returns true while a poll runs.
    pub async fn is_refreshing(&self) -> bool {
        self.inner.read().await.refresh_in_progress
    }

    /// When the last poll finished.
    pub async fn last_refresh(&self) -> Option<DateTime<Utc>> {
        self.inner.read().await.last_refresh
    }

    // ========================================================================
    // Errors
    // ========================================================================

    /// Error of the most recent failed poll.
    pub async fn error(&self) -> Option<String> {
        self.inner.read().await.error.clone()
    }

    /// Records a failed poll. The last good result is kept.
    pub async fn set_error(&self, error: String) {
        warn!(error = %error, "Poll failed");
        self.inner.write().await.error = Some(error);
        self.notify_change();
    }

    // ========================================================================
    // Observable
    // ========================================================================

    /// Subscribes to store changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    fn notify_change(&self) {
        self.notify.send_modify(|version| *version += 1);
    }

    // ========================================================================
    // Staleness
    // ========================================================================

    /// Returns true if there is no result or it is older than `threshold`.
    pub async fn is_stale(&self, threshold: Duration) -> bool {
        match self.inner.read().await.result.as_ref() {
            Some(result) => {
                let age = Utc::now().signed_duration_since(result.fetched_at);
                age > chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX)
            }
            None => true,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ovolink_core::{AccountId, ChargeType, HourlySeriesKind, UsagePeriodEntry};

    fn result(solar: f64, hourly: Option<HourlySeries>) -> PollResult {
        PollResult {
            account_id: AccountId::new("1"),
            daily: AggregatedSnapshot {
                solar_consumption: solar,
                ..Default::default()
            },
            monthly: AggregatedSnapshot::default(),
            yearly: AggregatedSnapshot::default(),
            hourly,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_and_read() {
        let store = UsageStore::new();
        let mut rx = store.subscribe();
        assert!(store.latest().await.is_none());
        assert!(store.is_stale(Duration::from_secs(60)).await);

        store.publish(result(4.0, None)).await;
        assert!(rx.has_changed().unwrap());
        let daily = store.snapshot(Granularity::Daily).await.unwrap();
        assert!((daily.solar_consumption - 4.0).abs() < f64::EPSILON);
        assert!(store.snapshot(Granularity::Hourly).await.is_none());
        assert!(!store.is_stale(Duration::from_secs(60)).await);
    }

    #[tokio::test]
    async fn test_error_keeps_last_good_result() {
        let store = UsageStore::new();
        store.publish(result(4.0, None)).await;
        store.set_error("Communication error".to_string()).await;

        assert_eq!(store.error().await.as_deref(), Some("Communication error"));
        assert!(store.latest().await.is_some());

        store.publish(result(5.0, None)).await;
        assert!(store.error().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_hourly_keeps_previous_series() {
        let store = UsageStore::new();
        let series = HourlySeries {
            solar_entries: vec![UsagePeriodEntry::new("2024-03-01T00:00:00Z", 1.0, 0.0, ChargeType::Debit)],
            solar_total: 1.0,
            ..Default::default()
        };
        store.publish(result(1.0, Some(series))).await;
        store.publish(result(2.0, None)).await;

        let hourly = store.hourly().await.unwrap();
        assert_eq!(hourly.count(HourlySeriesKind::Solar), 1);
    }

    #[tokio::test]
    async fn test_refresh_tracking() {
        let store = UsageStore::new();
        assert!(!store.is_refreshing().await);

        store.start_refresh().await.unwrap();
        assert!(store.is_refreshing().await);
        assert!(store.start_refresh().await.is_err());

        store.end_refresh().await;
        assert!(!store.is_refreshing().await);
        assert!(store.last_refresh().await.is_some());
    }
}

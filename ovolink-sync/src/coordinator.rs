//! One poll cycle per account, with concurrent requests coalesced.
//!
//! A cycle runs strictly in sequence:
//!
//! ```text
//! interval fetch -> hourly fetch -> reduce -> merge statistics -> publish
//! ```
//!
//! An hourly failure is logged and skips the statistics step; the interval
//! snapshots are still published. Statistics are merged only after both
//! fetches completed, so an abandoned cycle commits nothing.
//!
//! A request arriving while a cycle is in flight awaits that cycle instead
//! of starting a second one. A rejected session is renewed at most once
//! per cycle through the [`Reauthenticator`], inside the shared cycle, so
//! every waiter sees the same login and the same retry.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use ovolink_api::{reduce_hourly, reduce_interval, OvoApiClient};
use ovolink_core::{AccountId, IntervalData, PollResult, UsageData};
use ovolink_fetch::FetchError;
use ovolink_store::{StatisticsMerger, UsageStore};
use tracing::{debug, error, info, instrument, warn};

use crate::error::SyncError;

// ============================================================================
// Usage Source
// ============================================================================

/// Where a poll cycle reads usage from.
#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Daily, monthly and yearly usage.
    async fn interval_data(&self, account: &AccountId) -> Result<IntervalData, FetchError>;

    /// Hourly usage for `[start, end]`.
    async fn hourly_data(
        &self,
        account: &AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<UsageData, FetchError>;
}

#[async_trait]
impl UsageSource for OvoApiClient {
    async fn interval_data(&self, account: &AccountId) -> Result<IntervalData, FetchError> {
        self.fetch_interval_data(account).await
    }

    async fn hourly_data(
        &self,
        account: &AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<UsageData, FetchError> {
        self.fetch_hourly_data(account, start, end).await
    }
}

/// Anything that can run one poll cycle.
#[async_trait]
pub trait PollRunner: Send + Sync {
    /// Runs (or joins) a poll cycle.
    async fn run_poll(&self) -> Result<PollResult, SyncError>;
}

/// Renews a rejected session without user interaction.
#[async_trait]
pub trait Reauthenticator: Send + Sync {
    /// Installs new credentials; `false` when none can be obtained.
    async fn reauthenticate(&self) -> Result<bool, SyncError>;
}

/// Hourly query window ending today in `tz`.
pub fn hourly_window(now: DateTime<Utc>, tz: Tz, lookback_days: u32) -> (NaiveDate, NaiveDate) {
    let today = now.with_timezone(&tz).date_naive();
    (today - Duration::days(i64::from(lookback_days)), today)
}

// ============================================================================
// Poll Pipeline
// ============================================================================

#[derive(Clone)]
struct PollPipeline {
    source: Arc<dyn UsageSource>,
    account_id: AccountId,
    merger: Option<StatisticsMerger>,
    reauth: Option<Arc<dyn Reauthenticator>>,
    usage: UsageStore,
    tz: Tz,
    lookback_days: u32,
}

impl PollPipeline {
    #[instrument(skip(self), fields(account = %self.account_id))]
    async fn run(&self) -> Result<PollResult, SyncError> {
        if let Err(e) = self.usage.start_refresh().await {
            warn!(error = %e, "Refresh flag already set");
        }

        let mut result = self.execute().await;
        if let (Err(e), Some(reauth)) = (&result, &self.reauth) {
            if e.requires_reauth() {
                match reauth.reauthenticate().await {
                    Ok(true) => {
                        info!("Session renewed, retrying poll");
                        result = self.execute().await;
                    }
                    Ok(false) => debug!("No unattended login available"),
                    Err(login) => {
                        error!(error = %login, "Re-login failed");
                        result = Err(login);
                    }
                }
            }
        }

        match &result {
            Ok(poll) => self.usage.publish(poll.clone()).await,
            Err(e) => self.usage.set_error(e.to_string()).await,
        }
        self.usage.end_refresh().await;
        result
    }

    async fn execute(&self) -> Result<PollResult, SyncError> {
        let interval = self.source.interval_data(&self.account_id).await?;

        let (start, end) = hourly_window(Utc::now(), self.tz, self.lookback_days);
        let hourly = match self.source.hourly_data(&self.account_id, start, end).await {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(error = %e, "Hourly fetch failed, statistics skipped this cycle");
                None
            }
        };

        let (daily, monthly, yearly) = reduce_interval(&interval);
        let hourly = hourly.as_ref().map(reduce_hourly);

        if let (Some(series), Some(merger)) = (&hourly, &self.merger) {
            if let Err(e) = merger.import_hourly(&self.account_id, series).await {
                error!(error = %e, "Statistics import failed");
            }
        }

        info!(
            solar = daily.solar_consumption,
            grid = daily.grid_consumption,
            return_to_grid = daily.return_to_grid,
            hourly = hourly.is_some(),
            "Poll completed"
        );
        Ok(PollResult {
            account_id: self.account_id.clone(),
            daily,
            monthly,
            yearly,
            hourly,
            fetched_at: Utc::now(),
        })
    }
}

// ============================================================================
// Poll Coordinator
// ============================================================================

type PollFuture = BoxFuture<'static, Result<PollResult, SyncError>>;

/// Single-owner run lock for one account's poll cycle.
///
/// Only waiters keep a cycle alive; once every waiter is gone the cycle is
/// dropped, and the next request starts a fresh one.
pub struct PollCoordinator {
    pipeline: Arc<PollPipeline>,
    in_flight: Mutex<Option<WeakShared<PollFuture>>>,
}

impl std::fmt::Debug for PollCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollCoordinator")
            .field("account_id", &self.pipeline.account_id)
            .field("tz", &self.pipeline.tz)
            .finish_non_exhaustive()
    }
}

impl PollCoordinator {
    /// Creates a coordinator for `account_id`.
    pub fn new(
        source: Arc<dyn UsageSource>,
        account_id: AccountId,
        usage: UsageStore,
        tz: Tz,
        lookback_days: u32,
    ) -> Self {
        Self {
            pipeline: Arc::new(PollPipeline {
                source,
                account_id,
                merger: None,
                reauth: None,
                usage,
                tz,
                lookback_days,
            }),
            in_flight: Mutex::new(None),
        }
    }

    /// Merges every hourly batch through `merger`.
    #[must_use]
    pub fn with_merger(self, merger: StatisticsMerger) -> Self {
        self.map_pipeline(|p| p.merger = Some(merger))
    }

    /// Renews a rejected session through `reauth` and retries once.
    #[must_use]
    pub fn with_reauthenticator(self, reauth: Arc<dyn Reauthenticator>) -> Self {
        self.map_pipeline(|p| p.reauth = Some(reauth))
    }

    fn map_pipeline(self, f: impl FnOnce(&mut PollPipeline)) -> Self {
        let mut pipeline = PollPipeline::clone(&self.pipeline);
        f(&mut pipeline);
        Self {
            pipeline: Arc::new(pipeline),
            in_flight: Mutex::new(None),
        }
    }

    /// The polled account.
    pub fn account_id(&self) -> &AccountId {
        &self.pipeline.account_id
    }

    /// Published state.
    pub fn usage(&self) -> &UsageStore {
        &self.pipeline.usage
    }

    /// Runs a cycle, or joins the one in flight.
    ///
    /// # Errors
    ///
    /// The classified error of the interval fetch. Hourly and statistics
    /// failures are logged, not returned.
    pub async fn poll_once(&self) -> Result<PollResult, SyncError> {
        let poll = {
            let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref().and_then(WeakShared::upgrade) {
                Some(running) if running.peek().is_none() => {
                    debug!(account = %self.pipeline.account_id, "Joining in-flight poll");
                    running
                }
                _ => {
                    let pipeline = Arc::clone(&self.pipeline);
                    let poll: Shared<PollFuture> = async move { pipeline.run().await }.boxed().shared();
                    *slot = poll.downgrade();
                    poll
                }
            }
        };
        poll.await
    }
}

#[async_trait]
impl PollRunner for PollCoordinator {
    async fn run_poll(&self) -> Result<PollResult, SyncError> {
        self.poll_once().await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Australia::Sydney;
    use ovolink_core::{ChargeType, UsagePeriodEntry};
    use ovolink_store::SqliteStatisticsStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts calls and answers from canned data.
    #[derive(Default)]
    pub(crate) struct FakeSource {
        pub interval_calls: AtomicUsize,
        pub hourly_calls: AtomicUsize,
        pub fail_interval: bool,
        pub fail_hourly: bool,
        pub delay_ms: u64,
        /// Interval calls still to be answered with a login page.
        pub rejections: AtomicUsize,
    }

    fn entry(from: &str, consumption: f64, charge_type: ChargeType) -> UsagePeriodEntry {
        UsagePeriodEntry::new(from, consumption, 0.1, charge_type)
    }

    #[async_trait]
    impl UsageSource for FakeSource {
        async fn interval_data(&self, _account: &AccountId) -> Result<IntervalData, FetchError> {
            self.interval_calls.fetch_add(1, Ordering::SeqCst);
            if self.delay_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
            }
            let rejected = self
                .rejections
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if self.fail_interval || rejected {
                return Err(FetchError::HtmlResponse {
                    content_type: "text/html".into(),
                });
            }
            Ok(IntervalData {
                daily: UsageData {
                    solar: vec![entry("2024-03-01", 10.0, ChargeType::Debit)],
                    export: vec![
                        entry("2024-02-29", 5.0, ChargeType::Debit),
                        entry("2024-03-01", 8.0, ChargeType::Credit),
                    ],
                },
                ..Default::default()
            })
        }

        async fn hourly_data(
            &self,
            _account: &AccountId,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<UsageData, FetchError> {
            self.hourly_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_hourly {
                return Err(FetchError::Status {
                    status: 500,
                    body: "oops".into(),
                });
            }
            Ok(UsageData {
                solar: vec![
                    entry("2024-03-01T10:00:00Z", 1.0, ChargeType::Debit),
                    entry("2024-03-01T11:00:00Z", 2.0, ChargeType::Debit),
                ],
                export: vec![entry("2024-03-01T10:00:00Z", 0.5, ChargeType::Credit)],
            })
        }
    }

    fn coordinator(source: Arc<FakeSource>) -> PollCoordinator {
        PollCoordinator::new(source, AccountId::new("30001"), UsageStore::new(), Sydney, 7)
    }

    #[test]
    fn test_hourly_window_uses_local_date() {
        // 20:00 UTC on Mar 1 is already Mar 2 in Sydney.
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 20, 0, 0).unwrap();
        let (start, end) = hourly_window(now, Sydney, 7);
        assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 2, 24).unwrap());
    }

    #[tokio::test]
    async fn test_poll_reduces_and_publishes() {
        let source = Arc::new(FakeSource::default());
        let coordinator = coordinator(source.clone());

        let result = coordinator.poll_once().await.unwrap();
        assert!((result.daily.return_to_grid - 8.0).abs() < f64::EPSILON);
        assert!(result.daily.grid_consumption.abs() < f64::EPSILON);
        assert!((result.hourly.as_ref().unwrap().solar_total - 3.0).abs() < f64::EPSILON);

        let published = coordinator.usage().latest().await.unwrap();
        assert_eq!(published, result);
        assert!(!coordinator.usage().is_refreshing().await);
    }

    #[tokio::test]
    async fn test_concurrent_polls_coalesce() {
        let source = Arc::new(FakeSource {
            delay_ms: 50,
            ..Default::default()
        });
        let coordinator = coordinator(source.clone());

        let (a, b) = tokio::join!(coordinator.poll_once(), coordinator.poll_once());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(source.interval_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.hourly_calls.load(Ordering::SeqCst), 1);

        coordinator.poll_once().await.unwrap();
        assert_eq!(source.interval_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_poll_is_not_resumed() {
        let source = Arc::new(FakeSource {
            delay_ms: 50,
            ..Default::default()
        });
        let coordinator = coordinator(source.clone());

        let abandoned =
            tokio::time::timeout(std::time::Duration::from_millis(10), coordinator.poll_once()).await;
        assert!(abandoned.is_err());

        coordinator.poll_once().await.unwrap();
        assert_eq!(source.interval_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.hourly_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hourly_failure_is_not_fatal() {
        let store = Arc::new(SqliteStatisticsStore::open_in_memory().unwrap());
        let source = Arc::new(FakeSource {
            fail_hourly: true,
            ..Default::default()
        });
        let coordinator =
            coordinator(source).with_merger(StatisticsMerger::new(store.clone(), Sydney));

        let result = coordinator.poll_once().await.unwrap();
        assert!(result.hourly.is_none());
        assert!((result.daily.solar_consumption - 10.0).abs() < f64::EPSILON);
        assert!(store.statistic_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_statistics_merged_after_full_fetch() {
        let store = Arc::new(SqliteStatisticsStore::open_in_memory().unwrap());
        let source = Arc::new(FakeSource::default());
        let coordinator =
            coordinator(source).with_merger(StatisticsMerger::new(store.clone(), Sydney));

        coordinator.poll_once().await.unwrap();
        assert_eq!(store.statistic_ids().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failure_keeps_last_good_snapshot() {
        let coordinator = coordinator(Arc::new(FakeSource::default()));
        let good = coordinator.poll_once().await.unwrap();

        let failing = PollCoordinator::new(
            Arc::new(FakeSource {
                fail_interval: true,
                ..Default::default()
            }),
            AccountId::new("30001"),
            coordinator.usage().clone(),
            Sydney,
            7,
        );
        let err = failing.poll_once().await.unwrap_err();
        assert!(err.requires_reauth());

        assert_eq!(coordinator.usage().latest().await.unwrap(), good);
        assert!(coordinator.usage().error().await.is_some());
    }

    /// Counts logins; succeeds unless `fail` is set.
    #[derive(Default)]
    struct CountingLogin {
        calls: AtomicUsize,
        available: bool,
        fail: bool,
    }

    #[async_trait]
    impl Reauthenticator for CountingLogin {
        async fn reauthenticate(&self) -> Result<bool, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            if self.fail {
                return Err(FetchError::AuthenticationFailed("bad password".into()).into());
            }
            Ok(self.available)
        }
    }

    #[tokio::test]
    async fn test_concurrent_rejected_polls_share_one_login() {
        let source = Arc::new(FakeSource {
            delay_ms: 50,
            rejections: AtomicUsize::new(1),
            ..Default::default()
        });
        let login = Arc::new(CountingLogin {
            available: true,
            ..Default::default()
        });
        let coordinator = coordinator(source.clone()).with_reauthenticator(login.clone());

        let (a, b) = tokio::join!(coordinator.poll_once(), coordinator.poll_once());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
        // One rejected attempt and one retry.
        assert_eq!(source.interval_calls.load(Ordering::SeqCst), 2);
        assert_eq!(source.hourly_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_without_login_is_surfaced() {
        let source = Arc::new(FakeSource {
            rejections: AtomicUsize::new(1),
            ..Default::default()
        });
        let login = Arc::new(CountingLogin::default());
        let coordinator = coordinator(source.clone()).with_reauthenticator(login.clone());

        let err = coordinator.poll_once().await.unwrap_err();
        assert!(err.requires_reauth());
        assert_eq!(login.calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.interval_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_login_replaces_error_and_skips_retry() {
        let source = Arc::new(FakeSource {
            rejections: AtomicUsize::new(1),
            ..Default::default()
        });
        let login = Arc::new(CountingLogin {
            fail: true,
            ..Default::default()
        });
        let coordinator = coordinator(source.clone()).with_reauthenticator(login);

        let err = coordinator.poll_once().await.unwrap_err();
        assert!(err.to_string().contains("bad password"));
        assert_eq!(source.interval_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_does_not_login() {
        let source = Arc::new(FakeSource::default());
        let login = Arc::new(CountingLogin {
            available: true,
            ..Default::default()
        });
        let coordinator = coordinator(source).with_reauthenticator(login.clone());

        coordinator.poll_once().await.unwrap();
        assert_eq!(login.calls.load(Ordering::SeqCst), 0);
    }
}

//! Daily poll at a fixed local hour.
//!
//! Two states: `Idle` (no timer) and `Armed` (one timer for the next
//! occurrence of the hour). The scheduler arms at start and again right
//! after every fire. Scheduled and out-of-band polls both run as tasks
//! through the poll runner, so a manual request arriving mid-poll joins the
//! cycle already in flight. Out-of-band refreshes never touch the timer.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::coordinator::PollRunner;

/// Next occurrence of `hour:00` in `tz` strictly after `now`.
///
/// If the hour does not exist on a day (DST gap), the first instant after
/// the gap is used.
pub fn next_fire(now: DateTime<Utc>, hour: u32, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();
    (0..=2)
        .filter_map(|offset| fire_on(today + Duration::days(offset), hour, tz))
        .find(|at| *at > now)
        .unwrap_or_else(|| now + Duration::days(1))
}

fn fire_on(date: NaiveDate, hour: u32, tz: Tz) -> Option<DateTime<Utc>> {
    let local = date.and_hms_opt(hour, 0, 0)?;
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|at| at.with_timezone(&Utc))
}

/// Timer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No timer armed.
    Idle,
    /// Timer armed for `next_fire`.
    Armed {
        /// When the timer fires.
        next_fire: DateTime<Utc>,
    },
}

/// Fires a poll once per day at a fixed local hour.
#[derive(Debug)]
pub struct DailyScheduler {
    update_hour: u32,
    tz: Tz,
    state: SchedulerState,
}

impl DailyScheduler {
    /// Creates an idle scheduler.
    pub fn new(update_hour: u32, tz: Tz) -> Self {
        Self {
            update_hour,
            tz,
            state: SchedulerState::Idle,
        }
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Arms the timer for the next occurrence after `now`.
    pub fn arm(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let next_fire = next_fire(now, self.update_hour, self.tz);
        self.state = SchedulerState::Armed { next_fire };
        next_fire
    }

    /// Consumes the armed timer.
    pub fn fire(&mut self) {
        self.state = SchedulerState::Idle;
    }

    /// Arms for the next occurrence after `after` and returns the wait from `now`.
    fn arm_delay(&mut self, after: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
        let next_fire = self.arm(after);
        info!(%next_fire, "Next scheduled poll");
        (next_fire - now).to_std().unwrap_or_default()
    }

    /// Runs until `shutdown` becomes true.
    ///
    /// Each `()` on `manual` starts an out-of-band poll without re-arming.
    /// Polls still running at shutdown, scheduled or manual, are abandoned.
    pub async fn run(
        mut self,
        runner: Arc<dyn PollRunner>,
        mut manual: mpsc::Receiver<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(hour = self.update_hour, zone = %self.tz, "Scheduler started");
        let mut manual_open = true;
        let mut polls = JoinSet::new();

        let now = Utc::now();
        let sleep = tokio::time::sleep(self.arm_delay(now, now));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => {
                    let now = Utc::now();
                    let fired = match self.state {
                        SchedulerState::Armed { next_fire } => next_fire.max(now),
                        SchedulerState::Idle => now,
                    };
                    self.fire();
                    debug!("Scheduled poll firing");
                    spawn_poll(&mut polls, &runner, "scheduled");
                    // Arm past the instant that fired, even if the timer woke early.
                    let delay = self.arm_delay(fired, now);
                    sleep.as_mut().reset(Instant::now() + delay);
                }
                request = manual.recv(), if manual_open => {
                    if request.is_none() {
                        manual_open = false;
                        continue;
                    }
                    debug!("Manual refresh requested");
                    spawn_poll(&mut polls, &runner, "manual");
                }
                Some(joined) = polls.join_next(), if !polls.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Poll task failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        if !polls.is_empty() {
                            info!(running = polls.len(), "Abandoning running polls");
                        }
                        polls.abort_all();
                        self.state = SchedulerState::Idle;
                        info!("Scheduler stopped");
                        return;
                    }
                }
            }
        }
    }
}

fn spawn_poll(polls: &mut JoinSet<()>, runner: &Arc<dyn PollRunner>, trigger: &'static str) {
    let runner = Arc::clone(runner);
    polls.spawn(async move {
        log_outcome(trigger, &runner.run_poll().await.map(|_| ()));
    });
}

fn log_outcome(trigger: &str, result: &Result<(), crate::error::SyncError>) {
    match result {
        Ok(()) => debug!(trigger, "Poll finished"),
        Err(e) if e.requires_reauth() => {
            error!(trigger, error = %e, "Poll failed, re-authentication required");
        }
        Err(e) => warn!(trigger, error = %e, "Poll failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::tests::FakeSource;
    use crate::coordinator::PollCoordinator;
    use chrono_tz::Australia::Sydney;
    use ovolink_core::AccountId;
    use ovolink_store::UsageStore;
    use std::sync::atomic::Ordering;

    fn sydney(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Sydney
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_fires_later_today() {
        let now = sydney(2024, 3, 1, 1, 30);
        assert_eq!(next_fire(now, 2, Sydney), sydney(2024, 3, 1, 2, 0));
    }

    #[test]
    fn test_passed_hour_fires_tomorrow() {
        let now = sydney(2024, 3, 1, 2, 0);
        assert_eq!(next_fire(now, 2, Sydney), sydney(2024, 3, 2, 2, 0));

        let now = sydney(2024, 3, 1, 23, 59);
        assert_eq!(next_fire(now, 2, Sydney), sydney(2024, 3, 2, 2, 0));
    }

    #[test]
    fn test_dst_gap_fires_after_gap() {
        // 02:00 does not exist on 2024-10-06 in Sydney.
        let now = sydney(2024, 10, 5, 12, 0);
        let fire = next_fire(now, 2, Sydney);
        assert_eq!(fire, sydney(2024, 10, 6, 3, 0));
        assert_eq!(fire, Utc.with_ymd_and_hms(2024, 10, 5, 16, 0, 0).unwrap());
    }

    #[test]
    fn test_state_transitions() {
        let mut scheduler = DailyScheduler::new(2, Sydney);
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let at = scheduler.arm(sydney(2024, 3, 1, 12, 0));
        assert_eq!(scheduler.state(), SchedulerState::Armed { next_fire: at });

        scheduler.fire();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_manual_refresh_runs_and_shutdown_stops() {
        let source = Arc::new(FakeSource::default());
        let coordinator = Arc::new(PollCoordinator::new(
            source.clone(),
            AccountId::new("1"),
            UsageStore::new(),
            Sydney,
            7,
        ));
        let (manual_tx, manual_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(DailyScheduler::new(2, Sydney).run(
            coordinator.clone(),
            manual_rx,
            shutdown_rx,
        ));

        let mut updates = coordinator.usage().subscribe();
        manual_tx.send(()).await.unwrap();
        while coordinator.usage().latest().await.is_none() {
            updates.changed().await.unwrap();
        }
        assert_eq!(source.interval_calls.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    /// Advances paused time until the first poll reaches the source.
    async fn wait_for_poll_start(source: &FakeSource) {
        while source.interval_calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        }
    }

    fn slow_coordinator(source: &Arc<FakeSource>) -> Arc<PollCoordinator> {
        Arc::new(PollCoordinator::new(
            source.clone(),
            AccountId::new("1"),
            UsageStore::new(),
            Sydney,
            7,
        ))
    }

    fn slow_source() -> Arc<FakeSource> {
        Arc::new(FakeSource {
            delay_ms: 2 * 60 * 60 * 1000,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_joins_scheduled_poll() {
        let source = slow_source();
        let coordinator = slow_coordinator(&source);
        let (manual_tx, manual_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(DailyScheduler::new(2, Sydney).run(
            coordinator.clone(),
            manual_rx,
            shutdown_rx,
        ));

        wait_for_poll_start(&source).await;
        manual_tx.send(()).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(5 * 60 * 60)).await;

        assert!(coordinator.usage().latest().await.is_some());
        assert_eq!(source.interval_calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.hourly_calls.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_running_poll() {
        let source = slow_source();
        let coordinator = slow_coordinator(&source);
        let (_manual_tx, manual_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(DailyScheduler::new(2, Sydney).run(
            coordinator.clone(),
            manual_rx,
            shutdown_rx,
        ));

        wait_for_poll_start(&source).await;
        shutdown_tx.send(true).unwrap();
        task.await.unwrap();

        tokio::time::sleep(std::time::Duration::from_secs(5 * 60 * 60)).await;
        assert!(coordinator.usage().latest().await.is_none());
        assert_eq!(source.hourly_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_false_keeps_poll_running() {
        let source = slow_source();
        let coordinator = slow_coordinator(&source);
        let (_manual_tx, manual_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(DailyScheduler::new(2, Sydney).run(
            coordinator.clone(),
            manual_rx,
            shutdown_rx,
        ));

        wait_for_poll_start(&source).await;
        shutdown_tx.send(false).unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(5 * 60 * 60)).await;

        assert!(!task.is_finished());
        assert!(coordinator.usage().latest().await.is_some());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }
}

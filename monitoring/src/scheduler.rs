//! Periodic probe scheduler
//!
//! Every tick probes the configured instances one after another and records
//! the result. Ticks never overlap, and the first tick only runs once the
//! cache warm-up has finished.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use redis_monitoring_models::PingSample;

use crate::cache::{WarmupReport, WindowedHealthCache};
use crate::checker::HealthChecker;
use crate::clock::Clock;
use crate::config::InstanceConfig;
use crate::lifecycle::Lifecycle;
use crate::notifier::Notifier;
use crate::telemetry;
use crate::{MonitoringError, Result};

/// Observable scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Waiting for the next tick
    Idle,

    /// A tick is in progress
    Running,
}

struct Inner {
    instances: Vec<InstanceConfig>,
    interval: Duration,
    checker: Arc<dyn HealthChecker>,
    notifier: Arc<dyn Notifier>,
    health: Arc<WindowedHealthCache>,
    clock: Arc<dyn Clock>,
    state: RwLock<SchedulerState>,
    tick_guard: tokio::sync::Mutex<()>,
    cancel: Mutex<Option<CancellationToken>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Resets the state to idle when a tick ends, including on error
struct RunningState<'a>(&'a RwLock<SchedulerState>);

impl<'a> RunningState<'a> {
    fn enter(state: &'a RwLock<SchedulerState>) -> Self {
        *state.write() = SchedulerState::Running;
        Self(state)
    }
}

impl Drop for RunningState<'_> {
    fn drop(&mut self) {
        *self.0.write() = SchedulerState::Idle;
    }
}

/// Drives health checks on a fixed interval
#[derive(Clone)]
pub struct MonitoringScheduler {
    inner: Arc<Inner>,
}

impl MonitoringScheduler {
    pub fn new(
        instances: Vec<InstanceConfig>,
        interval: Duration,
        checker: Arc<dyn HealthChecker>,
        notifier: Arc<dyn Notifier>,
        health: Arc<WindowedHealthCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                instances,
                interval,
                checker,
                notifier,
                health,
                clock,
                state: RwLock::new(SchedulerState::Idle),
                tick_guard: tokio::sync::Mutex::new(()),
                cancel: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.inner.state.read()
    }

    /// Check if the scheduler has been started, warm-up included
    pub fn is_running(&self) -> bool {
        self.inner.cancel.lock().is_some()
    }

    /// Probe and record every instance once, in configuration order.
    ///
    /// The first error aborts the tick; instances after the failing one are
    /// not probed.
    pub async fn run_tick(&self) -> Result<()> {
        let _tick = self.inner.tick_guard.lock().await;
        let _running = RunningState::enter(&self.inner.state);
        let started = Instant::now();

        for instance in &self.inner.instances {
            self.probe_and_record(instance).await.map_err(|e| {
                error!(instance = %instance.name, error = %e, "Health check tick aborted");
                e
            })?;
        }

        debug!(
            instances = self.inner.instances.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Health check tick complete"
        );
        Ok(())
    }

    async fn probe_and_record(&self, instance: &InstanceConfig) -> Result<()> {
        let inner = &self.inner;

        let started = Instant::now();
        let healthy = inner
            .checker
            .check(&instance.name, &instance.connection_string)
            .await;
        let duration = healthy.then(|| started.elapsed());

        if !healthy {
            inner
                .notifier
                .notify(&format!("Redis instance '{}' is not responding", instance.name));
        }
        telemetry::record_probe(&instance.name, duration);

        let timestamp = inner.clock.now();
        let sample = match duration {
            Some(duration) => PingSample::success(timestamp, duration),
            None => PingSample::failure(timestamp),
        };

        inner.health.record(sample, &instance.name).await?;
        Ok(())
    }

    /// Warm the cache, then start the periodic loop.
    ///
    /// The first tick fires immediately after warm-up. The start slot is
    /// claimed before warm-up, so concurrent calls start at most one loop.
    pub async fn start(&self) -> Result<WarmupReport> {
        let token = {
            let mut slot = self.inner.cancel.lock();
            if slot.is_some() {
                return Err(MonitoringError::lifecycle(
                    "monitoring-scheduler",
                    "Scheduler already started",
                ));
            }
            let token = CancellationToken::new();
            *slot = Some(token.clone());
            token
        };

        let report = match self.inner.health.init_cache().await {
            Ok(report) => report,
            Err(e) => {
                // a concurrent stop has already released the slot
                if !token.is_cancelled() {
                    self.inner.cancel.lock().take();
                }
                return Err(e);
            }
        };

        if token.is_cancelled() {
            info!("Monitoring scheduler stopped during warm-up");
            return Ok(report);
        }

        let scheduler = self.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            scheduler.run_loop(loop_token).await;
        });
        *self.inner.task.lock() = Some(handle);

        info!(
            instances = self.inner.instances.len(),
            interval_secs = self.inner.interval.as_secs_f64(),
            "Monitoring scheduler started"
        );
        Ok(report)
    }

    async fn run_loop(&self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.run_tick().await {
                        warn!(error = %e, "Health check tick failed, retrying on next interval");
                        telemetry::record_tick_failure(e.category());
                    }
                }
            }
        }

        debug!("Monitoring loop exited");
    }

    /// Stop the periodic loop, waiting for a running tick to finish
    pub async fn stop(&self) -> Result<()> {
        let token = self.inner.cancel.lock().take();
        let handle = self.inner.task.lock().take();

        if let Some(token) = token {
            token.cancel();
        }
        if let Some(handle) = handle {
            handle.await.map_err(|e| {
                MonitoringError::lifecycle("monitoring-scheduler".to_string(), e.to_string())
            })?;
            info!("Monitoring scheduler stopped");
        }
        Ok(())
    }
}

#[async_trait]
impl Lifecycle for MonitoringScheduler {
    fn name(&self) -> &str {
        "monitoring-scheduler"
    }

    async fn start(&self) -> Result<()> {
        MonitoringScheduler::start(self).await.map(|_| ())
    }

    async fn stop(&self) -> Result<()> {
        MonitoringScheduler::stop(self).await
    }
}

impl std::fmt::Debug for MonitoringScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringScheduler")
            .field("instances", &self.inner.instances.len())
            .field("interval", &self.inner.interval)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemorySampleCache;
    use crate::checker::MockHealthChecker;
    use crate::clock::ManualClock;
    use crate::store::MemoryHealthRepository;
    use chrono::{TimeZone, Utc};

    #[derive(Default)]
    struct CollectingNotifier {
        messages: Mutex<Vec<String>>,
    }

    impl Notifier for CollectingNotifier {
        fn notify(&self, message: &str) {
            self.messages.lock().push(message.to_string());
        }
    }

    fn scheduler_with(
        checker: MockHealthChecker,
        notifier: Arc<CollectingNotifier>,
    ) -> (MonitoringScheduler, Arc<WindowedHealthCache>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let instances = vec![
            InstanceConfig::new("r1", "redis://r1:6379"),
            InstanceConfig::new("r2", "redis://r2:6379"),
        ];
        let health = Arc::new(
            WindowedHealthCache::new(
                Arc::new(MemorySampleCache::new(clock.clone())),
                Arc::new(MemoryHealthRepository::new()),
                clock.clone(),
                instances.iter().map(|i| i.name.clone()).collect(),
                Duration::from_secs(600),
            )
            .unwrap(),
        );
        let scheduler = MonitoringScheduler::new(
            instances,
            Duration::from_secs(30),
            Arc::new(checker),
            notifier,
            health.clone(),
            clock,
        );
        (scheduler, health)
    }

    #[tokio::test]
    async fn test_tick_records_every_instance() {
        let mut checker = MockHealthChecker::new();
        checker.expect_check().times(2).returning(|_, _| true);
        let notifier = Arc::new(CollectingNotifier::default());
        let (scheduler, health) = scheduler_with(checker, notifier.clone());

        scheduler.run_tick().await.unwrap();

        let all = health.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|h| h.is_alive()));
        assert!(notifier.messages.lock().is_empty());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_unhealthy_instance_notifies_and_records_failure() {
        let mut checker = MockHealthChecker::new();
        checker
            .expect_check()
            .times(2)
            .returning(|name, _| name != "r2");
        let notifier = Arc::new(CollectingNotifier::default());
        let (scheduler, health) = scheduler_with(checker, notifier.clone());

        scheduler.run_tick().await.unwrap();

        assert_eq!(
            *notifier.messages.lock(),
            vec!["Redis instance 'r2' is not responding".to_string()]
        );
        let r2 = health.get("r2").await.unwrap();
        assert_eq!(r2.samples.len(), 1);
        assert!(!r2.samples[0].is_success());
        assert!(!r2.is_alive());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut checker = MockHealthChecker::new();
        checker.expect_check().returning(|_, _| true);
        let (scheduler, health) = scheduler_with(checker, Arc::new(CollectingNotifier::default()));

        let report = scheduler.start().await.unwrap();
        assert_eq!(report, WarmupReport::default());
        assert!(scheduler.is_running());
        assert!(scheduler.start().await.is_err());

        // the first tick fires immediately
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await.unwrap();

        assert!(!scheduler.is_running());
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert_eq!(health.get("r1").await.unwrap().samples.len(), 1);
    }
}

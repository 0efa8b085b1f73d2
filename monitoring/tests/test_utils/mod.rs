//! Test utilities and helpers
//!
//! Fakes for the monitoring collaborators plus a fixed-clock fixture.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis_monitoring::cache::{CachedSample, MemorySampleCache, SampleKey, WriteMode};
use redis_monitoring::store::MemoryHealthRepository;
use redis_monitoring::{
    HealthChecker, HealthRepository, InstanceHealth, ManualClock, MonitoringError, Notifier, Result,
    SampleCache, WindowedHealthCache,
};

/// Instant `00:mm:ss` on the fixed test day
pub fn at(minute: u32, second: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, second).unwrap()
}

pub const WINDOW: Duration = Duration::from_secs(600);

/// Health cache over in-memory backends with a manual clock at 00:00
pub struct Fixture {
    pub clock: ManualClock,
    pub cache: MemorySampleCache,
    pub store: Arc<MemoryHealthRepository>,
    pub health: WindowedHealthCache,
}

impl Fixture {
    pub fn new(instances: &[&str]) -> Self {
        let clock = ManualClock::new(at(0, 0));
        let cache = MemorySampleCache::new(Arc::new(clock.clone()));
        let store = Arc::new(MemoryHealthRepository::new());
        let health = WindowedHealthCache::new(
            Arc::new(cache.clone()),
            store.clone(),
            Arc::new(clock.clone()),
            names(instances),
            WINDOW,
        )
        .unwrap();

        Self {
            clock,
            cache,
            store,
            health,
        }
    }
}

pub fn names(instances: &[&str]) -> Vec<String> {
    instances.iter().map(|s| s.to_string()).collect()
}

/// Sample cache whose every operation fails
#[derive(Debug, Default)]
pub struct FailingSampleCache;

#[async_trait]
impl SampleCache for FailingSampleCache {
    async fn write_sample(&self, _entry: &CachedSample, _ttl: Duration, _mode: WriteMode) -> Result<bool> {
        Err(MonitoringError::cache("cache unavailable"))
    }

    async fn live_index(&self, _instance: &str, _window_start: DateTime<Utc>) -> Result<Vec<SampleKey>> {
        Err(MonitoringError::cache("cache unavailable"))
    }

    async fn fetch_samples(&self, _keys: &[SampleKey]) -> Result<Vec<CachedSample>> {
        Err(MonitoringError::cache("cache unavailable"))
    }

    async fn last_success(&self, _instance: &str) -> Result<Option<DateTime<Utc>>> {
        Err(MonitoringError::cache("cache unavailable"))
    }

    async fn restore_last_success(&self, _instance: &str, _timestamp: DateTime<Utc>) -> Result<()> {
        Err(MonitoringError::cache("cache unavailable"))
    }
}

/// Memory repository that rejects saves for selected instances
#[derive(Debug, Default)]
pub struct SelectiveFailRepository {
    pub inner: MemoryHealthRepository,
    failing: HashSet<String>,
}

impl SelectiveFailRepository {
    pub fn failing_on(instances: &[&str]) -> Self {
        Self {
            inner: MemoryHealthRepository::new(),
            failing: instances.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[async_trait]
impl HealthRepository for SelectiveFailRepository {
    async fn save(&self, health: &InstanceHealth) -> Result<()> {
        if self.failing.contains(&health.name) {
            return Err(MonitoringError::internal(format!("write rejected for {}", health.name)));
        }
        self.inner.save(health).await
    }

    async fn get(&self, name: &str) -> Result<Option<InstanceHealth>> {
        self.inner.get(name).await
    }

    async fn get_all(&self) -> Result<Vec<InstanceHealth>> {
        self.inner.get_all().await
    }
}

/// Memory repository that yields on every call and counts warm-up reads
#[derive(Debug, Default)]
pub struct YieldingRepository {
    pub inner: MemoryHealthRepository,
    warmups: AtomicUsize,
}

impl YieldingRepository {
    pub fn warmups(&self) -> usize {
        self.warmups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthRepository for YieldingRepository {
    async fn save(&self, health: &InstanceHealth) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.save(health).await
    }

    async fn get(&self, name: &str) -> Result<Option<InstanceHealth>> {
        tokio::task::yield_now().await;
        self.inner.get(name).await
    }

    async fn get_all(&self) -> Result<Vec<InstanceHealth>> {
        self.warmups.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.inner.get_all().await
    }
}

/// Notifier that keeps every message
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

/// Checker with a fixed answer per instance that logs the call order.
///
/// Instances without an answer are reported healthy.
#[derive(Debug, Default)]
pub struct ScriptedChecker {
    answers: HashMap<String, bool>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedChecker {
    pub fn with_answers(answers: &[(&str, bool)]) -> Self {
        Self {
            answers: answers.iter().map(|(n, a)| (n.to_string(), *a)).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl HealthChecker for ScriptedChecker {
    async fn check(&self, name: &str, _connection_info: &str) -> bool {
        self.calls.lock().push(name.to_string());
        self.answers.get(name).copied().unwrap_or(true)
    }
}

//! Windowed health cache
//!
//! Keeps a rolling window of ping samples per instance in the fast cache and
//! reconciles it with the durable store. Samples expire on their own through
//! their TTL; the per-instance index is pruned lazily on every read.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use chrono::{DateTime, Utc};
use redis_monitoring_models::{chrono_window, window_start, InstanceHealth, PingSample};

use super::{CachedSample, SampleCache, WriteMode};
use crate::clock::Clock;
use crate::store::HealthRepository;
use crate::telemetry;
use crate::{MonitoringError, Result};

/// Outcome of a cache warm-up
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupReport {
    /// Samples written into the fast cache
    pub restored: usize,

    /// Samples already outside the window
    pub skipped_expired: usize,

    /// Samples the cache already held
    pub skipped_existing: usize,

    /// Sample or marker writes that failed
    pub failed: usize,
}

impl WarmupReport {
    /// Number of samples examined
    pub fn total(&self) -> usize {
        self.restored + self.skipped_expired + self.skipped_existing + self.failed
    }
}

/// Rolling per-instance history backed by a fast cache and a durable store
pub struct WindowedHealthCache {
    cache: Arc<dyn SampleCache>,
    store: Arc<dyn HealthRepository>,
    clock: Arc<dyn Clock>,
    instances: Vec<String>,
    window: chrono::Duration,
}

impl WindowedHealthCache {
    /// Create a cache over the configured instances, in configuration order
    pub fn new(
        cache: Arc<dyn SampleCache>,
        store: Arc<dyn HealthRepository>,
        clock: Arc<dyn Clock>,
        instances: Vec<String>,
        history_window: std::time::Duration,
    ) -> Result<Self> {
        let window = chrono_window(history_window)?;
        if window <= chrono::Duration::zero() {
            return Err(MonitoringError::invalid_config("History window must be positive"));
        }

        Ok(Self {
            cache,
            store,
            clock,
            instances,
            window,
        })
    }

    /// Configured instance names
    pub fn instances(&self) -> &[String] {
        &self.instances
    }

    pub fn history_window(&self) -> chrono::Duration {
        self.window
    }

    fn is_configured(&self, name: &str) -> bool {
        self.instances.iter().any(|n| n == name)
    }

    fn current_window_start(&self) -> DateTime<Utc> {
        window_start(self.clock.now(), self.window)
    }

    /// Load durable history into the fast cache.
    ///
    /// Safe to run repeatedly: samples are written only where absent and
    /// markers only move forward. Individual write failures are counted in
    /// the report rather than failing the warm-up.
    pub async fn init_cache(&self) -> Result<WarmupReport> {
        let now = self.clock.now();
        let rows = self.store.get_all().await?;
        let mut report = WarmupReport::default();

        for health in &rows {
            for sample in &health.samples {
                let Some(ttl) = sample.remaining_ttl(self.window, now) else {
                    report.skipped_expired += 1;
                    continue;
                };

                let entry = CachedSample::new(health.name.as_str(), *sample);
                match self.cache.write_sample(&entry, ttl, WriteMode::IfAbsent).await {
                    Ok(true) => report.restored += 1,
                    Ok(false) => report.skipped_existing += 1,
                    Err(e) => {
                        warn!(
                            instance = %health.name,
                            timestamp = %sample.timestamp,
                            error = %e,
                            "Failed to restore sample during warm-up"
                        );
                        telemetry::record_warmup_failure(&health.name);
                        report.failed += 1;
                    }
                }
            }

            if let Some(last_success) = health.last_success_time {
                if let Err(e) = self.cache.restore_last_success(&health.name, last_success).await {
                    warn!(instance = %health.name, error = %e, "Failed to restore last-success marker");
                    telemetry::record_warmup_failure(&health.name);
                    report.failed += 1;
                }
            }
        }

        info!(
            instances = rows.len(),
            restored = report.restored,
            skipped_expired = report.skipped_expired,
            skipped_existing = report.skipped_existing,
            failed = report.failed,
            "Health cache warm-up complete"
        );

        Ok(report)
    }

    /// Record a probe result for an instance.
    ///
    /// The fast-cache write is best effort; the durable upsert is not, and
    /// its failure is returned as [`MonitoringError::DurableWrite`].
    /// The persisted row builds on the stored one, so history the cache has
    /// lost is kept. Returns the health that was persisted.
    pub async fn record(&self, sample: PingSample, instance: &str) -> Result<InstanceHealth> {
        let now = self.clock.now();
        let start = window_start(now, self.window);

        match sample.remaining_ttl(self.window, now) {
            Some(ttl) => {
                let entry = CachedSample::new(instance, sample);
                if let Err(e) = self.cache.write_sample(&entry, ttl, WriteMode::Upsert).await {
                    error!(instance, timestamp = %sample.timestamp, error = %e, "Failed to write sample to cache");
                    telemetry::record_cache_write_failure(instance);
                }
            }
            None => debug!(instance, timestamp = %sample.timestamp, "Sample outside the window, not cached"),
        }

        let stored = self.durable_or_empty(instance, start).await?;
        let mut health = match self.live_or_none(instance, start).await {
            Some(live) => self.carry_forward(stored, live, now).await,
            None => stored,
        };

        health.merge_sample(sample);
        if sample.is_success() {
            health.observe_success(sample.timestamp);
        }
        health.retain_window(start);

        self.store
            .save(&health)
            .await
            .map_err(|e| MonitoringError::durable_write(instance, e))?;

        debug!(
            instance,
            samples = health.samples.len(),
            alive = health.is_alive(),
            "Recorded ping sample"
        );
        Ok(health)
    }

    /// Current health of one configured instance
    pub async fn get(&self, name: &str) -> Result<InstanceHealth> {
        if !self.is_configured(name) {
            return Err(MonitoringError::UnknownInstance(name.to_string()));
        }

        let start = self.current_window_start();
        match self.live_or_none(name, start).await {
            Some(health) => Ok(health),
            None => {
                telemetry::record_durable_fallback(name);
                self.durable_or_empty(name, start).await
            }
        }
    }

    /// Current health of every configured instance, in configuration order.
    ///
    /// When no instance has a live sample the cache is treated as cold and
    /// the whole answer comes from the durable store, which then only
    /// includes instances that have a stored row.
    pub async fn get_all(&self) -> Result<Vec<InstanceHealth>> {
        let start = self.current_window_start();

        let mut live = Vec::with_capacity(self.instances.len());
        for name in &self.instances {
            live.push(self.live_or_none(name, start).await);
        }

        if live.iter().all(Option::is_none) {
            warn!(
                instances = self.instances.len(),
                "Fast cache holds no live samples, serving durable history; cache warm-up is needed"
            );
            telemetry::record_cold_cache_read();

            let mut rows: HashMap<String, InstanceHealth> = self
                .store
                .get_all()
                .await?
                .into_iter()
                .map(|h| (h.name.clone(), h))
                .collect();

            return Ok(self
                .instances
                .iter()
                .filter_map(|name| rows.remove(name))
                .map(|h| h.windowed(start))
                .collect());
        }

        let mut result = Vec::with_capacity(self.instances.len());
        for (name, health) in self.instances.iter().zip(live) {
            match health {
                Some(health) => result.push(health),
                None => {
                    telemetry::record_durable_fallback(name);
                    result.push(self.durable_or_empty(name, start).await?);
                }
            }
        }
        Ok(result)
    }

    /// Rebuild health from live cache entries; `None` when there are none
    async fn load_live(&self, instance: &str, start: DateTime<Utc>) -> Result<Option<InstanceHealth>> {
        let keys = self.cache.live_index(instance, start).await?;
        if keys.is_empty() {
            return Ok(None);
        }

        let samples: Vec<PingSample> = self
            .cache
            .fetch_samples(&keys)
            .await?
            .into_iter()
            .filter(|entry| entry.name == instance)
            .map(|entry| entry.sample)
            .filter(|sample| sample.is_within(start))
            .collect();
        if samples.is_empty() {
            return Ok(None);
        }

        let marker = self.cache.last_success(instance).await?;
        let mut health = InstanceHealth::from_samples(instance, samples, marker);
        if let Some(latest) = health.latest_success_sample_time() {
            health.observe_success(latest);
        }
        Ok(Some(health))
    }

    async fn live_or_none(&self, instance: &str, start: DateTime<Utc>) -> Option<InstanceHealth> {
        match self.load_live(instance, start).await {
            Ok(health) => health,
            Err(e) => {
                warn!(instance, error = %e, "Cache read failed, falling back to durable store");
                telemetry::record_cache_read_failure(instance);
                None
            }
        }
    }

    /// Fold live cache entries over the stored row so a partially refilled
    /// cache cannot shrink the durable history. Live samples win on equal
    /// timestamps. Stored samples and a stored marker the cache lacks are
    /// written back to it.
    async fn carry_forward(
        &self,
        mut stored: InstanceHealth,
        live: InstanceHealth,
        now: DateTime<Utc>,
    ) -> InstanceHealth {
        for sample in &stored.samples {
            if live.samples.iter().any(|s| s.timestamp == sample.timestamp) {
                continue;
            }
            let Some(ttl) = sample.remaining_ttl(self.window, now) else {
                continue;
            };
            let entry = CachedSample::new(live.name.as_str(), *sample);
            if let Err(e) = self.cache.write_sample(&entry, ttl, WriteMode::IfAbsent).await {
                warn!(instance = %live.name, timestamp = %sample.timestamp, error = %e, "Failed to refill sample");
                telemetry::record_cache_write_failure(&live.name);
            }
        }

        if let Some(marker) = stored.last_success_time {
            if live.last_success_time.map_or(true, |t| t < marker) {
                if let Err(e) = self.cache.restore_last_success(&live.name, marker).await {
                    warn!(instance = %live.name, error = %e, "Failed to restore last-success marker");
                    telemetry::record_cache_write_failure(&live.name);
                }
            }
        }

        for sample in live.samples {
            stored.merge_sample(sample);
        }
        if let Some(last_success) = live.last_success_time {
            stored.observe_success(last_success);
        }
        stored
    }

    async fn durable_or_empty(&self, instance: &str, start: DateTime<Utc>) -> Result<InstanceHealth> {
        Ok(self
            .store
            .get(instance)
            .await?
            .map(|h| h.windowed(start))
            .unwrap_or_else(|| InstanceHealth::empty(instance)))
    }
}

impl std::fmt::Debug for WindowedHealthCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WindowedHealthCache")
            .field("instances", &self.instances)
            .field("window", &self.window)
            .finish()
    }
}

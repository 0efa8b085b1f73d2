//! Component wiring
//!
//! Builds the cache, store, checker and scheduler selected by the
//! configuration and registers them with a [`StartupManager`].

use std::sync::Arc;
use tracing::info;

use crate::cache::{MemorySampleCache, RedisSampleCache, SampleCache, WindowedHealthCache};
use crate::checker::{HealthChecker, RedisHealthChecker};
use crate::clock::{Clock, SystemClock};
use crate::config::{CacheBackend, DatabaseBackend, MonitoringConfig};
use crate::lifecycle::StartupManager;
use crate::notifier::{LogNotifier, Notifier};
use crate::scheduler::MonitoringScheduler;
use crate::store::{HealthRepository, MemoryHealthRepository, PostgresHealthRepository};
use crate::Result;

/// Fully wired monitoring service
pub struct MonitoringService {
    pub health: Arc<WindowedHealthCache>,
    pub scheduler: MonitoringScheduler,
    manager: StartupManager,
}

impl MonitoringService {
    /// Connect the configured backends and assemble the service
    pub async fn from_config(config: &MonitoringConfig) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let cache: Arc<dyn SampleCache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemorySampleCache::new(clock.clone())),
            CacheBackend::Redis => {
                Arc::new(RedisSampleCache::connect(&config.cache.url, config.cache.key_prefix.clone()).await?)
            }
        };

        let store: Arc<dyn HealthRepository> = match config.database.backend {
            DatabaseBackend::Memory => Arc::new(MemoryHealthRepository::new()),
            DatabaseBackend::Postgres => {
                let repo =
                    PostgresHealthRepository::connect(&config.database.url, config.database.max_connections).await?;
                if config.database.ensure_schema {
                    repo.ensure_schema().await?;
                }
                Arc::new(repo)
            }
        };

        info!(
            cache = ?config.cache.backend,
            database = ?config.database.backend,
            instances = config.monitoring.instances.len(),
            "Monitoring backends ready"
        );

        Self::assemble(
            config,
            cache,
            store,
            Arc::new(RedisHealthChecker::new(config.connect_timeout())),
            Arc::new(LogNotifier),
            clock,
        )
    }

    /// Assemble the service from already-built collaborators
    pub fn assemble(
        config: &MonitoringConfig,
        cache: Arc<dyn SampleCache>,
        store: Arc<dyn HealthRepository>,
        checker: Arc<dyn HealthChecker>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let health = Arc::new(WindowedHealthCache::new(
            cache,
            store,
            clock.clone(),
            config.instance_names(),
            config.history_window(),
        )?);

        let scheduler = MonitoringScheduler::new(
            config.monitoring.instances.clone(),
            config.check_interval(),
            checker,
            notifier,
            health.clone(),
            clock,
        );

        let mut manager = StartupManager::new();
        manager.register(Arc::new(scheduler.clone()));

        Ok(Self {
            health,
            scheduler,
            manager,
        })
    }

    /// Start every component in order
    pub async fn start(&mut self) -> Result<()> {
        self.manager.start_all().await
    }

    /// Stop every started component in reverse order
    pub async fn stop(&mut self) -> Result<()> {
        self.manager.stop_all().await
    }
}

impl std::fmt::Debug for MonitoringService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitoringService")
            .field("health", &self.health)
            .field("scheduler", &self.scheduler)
            .field("manager", &self.manager)
            .finish()
    }
}

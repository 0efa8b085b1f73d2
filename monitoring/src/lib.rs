//! # Redis Monitoring
//!
//! Periodically probes a set of named Redis instances, keeps a rolling
//! window of ping results per instance in a fast cache and falls back to a
//! durable store whenever the cache is cold.

pub mod cache;
pub mod checker;
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod telemetry;

pub use redis_monitoring_models::{InstanceHealth, PingSample};

pub use cache::{SampleCache, WarmupReport, WindowedHealthCache};
pub use checker::{HealthChecker, RedisHealthChecker};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{InstanceConfig, MonitoringConfig};
pub use error::{MonitoringError, Result};
pub use lifecycle::{Lifecycle, StartupManager};
pub use notifier::{ChannelNotifier, LogNotifier, Notifier};
pub use scheduler::{MonitoringScheduler, SchedulerState};
pub use service::MonitoringService;
pub use store::HealthRepository;

/// Current version of the monitoring service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Service identifier
pub const SYSTEM_NAME: &str = "redis-monitoring";

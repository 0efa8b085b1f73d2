//! Durable health history
//!
//! One row per instance holding its windowed samples and last success time.
//! The durable store is the source of truth whenever the fast cache is cold.

pub mod memory;
pub mod postgres;

pub use memory::MemoryHealthRepository;
pub use postgres::PostgresHealthRepository;

use async_trait::async_trait;

use redis_monitoring_models::InstanceHealth;

use crate::Result;

/// Row store for per-instance health
#[async_trait]
pub trait HealthRepository: Send + Sync {
    /// Insert or fully replace the row for `health.name`
    async fn save(&self, health: &InstanceHealth) -> Result<()>;

    async fn get(&self, name: &str) -> Result<Option<InstanceHealth>>;

    /// Every stored row, in no particular order
    async fn get_all(&self) -> Result<Vec<InstanceHealth>>;
}

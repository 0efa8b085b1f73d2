//! In-memory health repository for development and tests

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use redis_monitoring_models::InstanceHealth;

use super::HealthRepository;
use crate::Result;

/// Memory-backed [`HealthRepository`]
#[derive(Debug, Clone, Default)]
pub struct MemoryHealthRepository {
    rows: Arc<DashMap<String, InstanceHealth>>,
}

impl MemoryHealthRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Delete every row
    pub fn clear(&self) {
        self.rows.clear();
    }
}

#[async_trait]
impl HealthRepository for MemoryHealthRepository {
    async fn save(&self, health: &InstanceHealth) -> Result<()> {
        self.rows.insert(health.name.clone(), health.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<InstanceHealth>> {
        Ok(self.rows.get(name).map(|row| row.value().clone()))
    }

    async fn get_all(&self) -> Result<Vec<InstanceHealth>> {
        Ok(self.rows.iter().map(|row| row.value().clone()).collect())
    }
}

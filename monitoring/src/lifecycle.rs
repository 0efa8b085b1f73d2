//! Component start/stop ordering

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

use crate::{MonitoringError, Result};

/// A long-running component with an explicit start and stop
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Name used in logs and errors
    fn name(&self) -> &str;

    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// Starts components in registration order and stops them in reverse
#[derive(Default)]
pub struct StartupManager {
    components: Vec<Arc<dyn Lifecycle>>,
    started: usize,
}

impl StartupManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component; it starts after everything registered before it
    pub fn register(&mut self, component: Arc<dyn Lifecycle>) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Number of components currently started
    pub fn started(&self) -> usize {
        self.started
    }

    /// Start every registered component.
    ///
    /// Stops at the first failure; components already started stay running
    /// and are stopped by [`StartupManager::stop_all`].
    pub async fn start_all(&mut self) -> Result<()> {
        while self.started < self.components.len() {
            let component = &self.components[self.started];
            info!(component = component.name(), "Starting component");
            component.start().await.map_err(|e| {
                error!(component = component.name(), error = %e, "Component failed to start");
                MonitoringError::lifecycle(component.name().to_string(), e.to_string())
            })?;
            self.started += 1;
        }
        Ok(())
    }

    /// Stop started components in reverse order.
    ///
    /// Every component gets its stop call; the first error is returned.
    pub async fn stop_all(&mut self) -> Result<()> {
        let mut first_error = None;
        while self.started > 0 {
            self.started -= 1;
            let component = &self.components[self.started];
            info!(component = component.name(), "Stopping component");
            if let Err(e) = component.stop().await {
                error!(component = component.name(), error = %e, "Component failed to stop");
                first_error.get_or_insert(MonitoringError::lifecycle(component.name().to_string(), e.to_string()));
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for StartupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.components.iter().map(|c| c.name()).collect();
        f.debug_struct("StartupManager")
            .field("components", &names)
            .field("started", &self.started)
            .finish()
    }
}

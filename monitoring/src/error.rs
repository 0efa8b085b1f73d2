//! Error types for the monitoring service

use thiserror::Error;

/// Result type alias for monitoring operations
pub type Result<T> = std::result::Result<T, MonitoringError>;

/// Comprehensive error types for monitoring operations
#[derive(Error, Debug)]
pub enum MonitoringError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Model error: {0}")]
    Model(#[from] redis_monitoring_models::ModelError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Durable write failed for instance {instance}: {source}")]
    DurableWrite {
        instance: String,
        #[source]
        source: Box<MonitoringError>,
    },

    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    #[error("Lifecycle error: {component} - {message}")]
    Lifecycle { component: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MonitoringError {
    /// Create a new cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Wrap a durable store failure for an instance
    pub fn durable_write<S: Into<String>>(instance: S, source: MonitoringError) -> Self {
        Self::DurableWrite {
            instance: instance.into(),
            source: Box::new(source),
        }
    }

    /// Create a new lifecycle error
    pub fn lifecycle<S: Into<String>>(component: S, message: S) -> Self {
        Self::Lifecycle {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create a new configuration validation error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            MonitoringError::Database(_) => true,
            MonitoringError::Redis(_) => true,
            MonitoringError::Io(_) => true,
            MonitoringError::Cache { .. } => true,
            MonitoringError::DurableWrite { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Get the error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            MonitoringError::Config(_) => "config",
            MonitoringError::InvalidConfig(_) => "config",
            MonitoringError::Serialization(_) => "serialization",
            MonitoringError::Model(_) => "model",
            MonitoringError::Database(_) => "database",
            MonitoringError::Redis(_) => "cache",
            MonitoringError::Io(_) => "io",
            MonitoringError::Cache { .. } => "cache",
            MonitoringError::DurableWrite { .. } => "durable_write",
            MonitoringError::UnknownInstance(_) => "usage",
            MonitoringError::Lifecycle { .. } => "lifecycle",
            MonitoringError::Internal(_) => "internal",
        }
    }
}

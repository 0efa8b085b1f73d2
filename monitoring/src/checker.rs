//! Liveness probes for monitored instances

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Probe that reports whether an instance responds.
///
/// Implementations fail closed: any error means `false`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, name: &str, connection_info: &str) -> bool;
}

/// Checks an instance by connecting and sending `PING`.
///
/// `timeout` bounds the whole exchange, connect and reply together.
#[derive(Debug, Clone)]
pub struct RedisHealthChecker {
    timeout: Duration,
}

impl RedisHealthChecker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn ping(&self, connection_info: &str) -> redis::RedisResult<()> {
        let client = redis::Client::open(connection_info)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let reply: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(reply = %reply, "Ping reply");
        Ok(())
    }
}

impl Default for RedisHealthChecker {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl HealthChecker for RedisHealthChecker {
    async fn check(&self, name: &str, connection_info: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.ping(connection_info)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                info!(instance = name, error = %e, "Redis health check failed");
                false
            }
            Err(_) => {
                info!(
                    instance = name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Redis health check timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_connection_string_fails_closed() {
        let checker = RedisHealthChecker::default();
        assert!(!checker.check("broken", "not a url").await);
    }

    #[tokio::test]
    async fn test_unreachable_instance_fails_closed() {
        let checker = RedisHealthChecker::new(Duration::from_millis(200));
        assert!(!checker.check("closed-port", "redis://127.0.0.1:1").await);
    }

    #[tokio::test]
    async fn test_silent_instance_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        // accept connections and never answer
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let checker = RedisHealthChecker::new(Duration::from_millis(200));
        let url = format!("redis://127.0.0.1:{}", port);
        let healthy = tokio::time::timeout(Duration::from_secs(5), checker.check("silent", &url))
            .await
            .expect("check must finish within its own timeout");
        assert!(!healthy);

        server.abort();
    }

    #[tokio::test]
    #[ignore] // Requires Redis server
    async fn test_live_instance() {
        let checker = RedisHealthChecker::default();
        assert!(checker.check("local", "redis://localhost:6379").await);
    }
}

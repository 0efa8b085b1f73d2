//! # Redis Monitoring Models
//!
//! Data model shared by the monitoring service and its consumers:
//! individual ping samples and the per-instance health projection
//! rebuilt from a time window of samples.

pub mod error;
pub mod health;
pub mod sample;

pub use error::{ModelError, Result};
pub use health::InstanceHealth;
pub use sample::PingSample;

use chrono::{DateTime, Utc};

/// Current version of the models crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Start of the history window ending at `now`.
///
/// Samples with `timestamp >= window_start(now, window)` are current.
pub fn window_start(now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    now - window
}

/// Longest supported history window (30 days).
///
/// Keeps `now - window` and `timestamp + window` far from the chrono range limits.
pub const MAX_HISTORY_WINDOW: std::time::Duration = std::time::Duration::from_secs(30 * 24 * 60 * 60);

/// Convert a std window length into a chrono duration.
///
/// Windows longer than [`MAX_HISTORY_WINDOW`] are rejected.
pub fn chrono_window(window: std::time::Duration) -> Result<chrono::Duration> {
    if window > MAX_HISTORY_WINDOW {
        return Err(ModelError::WindowOutOfRange(window));
    }
    chrono::Duration::from_std(window).map_err(|_| ModelError::WindowOutOfRange(window))
}

//! Single liveness probe result

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One recorded probe outcome.
///
/// `duration` is present only when the probe succeeded. Failed probes are
/// still recorded so the history has no gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingSample {
    /// When the probe completed
    pub timestamp: DateTime<Utc>,

    /// Round-trip time of a successful probe
    pub duration: Option<Duration>,
}

impl PingSample {
    /// Create a sample for a probe that succeeded
    pub fn success(timestamp: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            timestamp,
            duration: Some(duration),
        }
    }

    /// Create a sample for a probe that failed
    pub fn failure(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            duration: None,
        }
    }

    /// Check if the probe succeeded
    pub fn is_success(&self) -> bool {
        self.duration.is_some()
    }

    /// Instant at which the sample leaves a window of the given length
    pub fn expires_at(&self, window: chrono::Duration) -> DateTime<Utc> {
        self.timestamp + window
    }

    /// Check if the sample is inside a window starting at `window_start`.
    ///
    /// The lower bound is closed.
    pub fn is_within(&self, window_start: DateTime<Utc>) -> bool {
        self.timestamp >= window_start
    }

    /// Time left before the sample expires, if any
    pub fn remaining_ttl(&self, window: chrono::Duration, now: DateTime<Utc>) -> Option<Duration> {
        (self.expires_at(window) - now)
            .to_std()
            .ok()
            .filter(|ttl| !ttl.is_zero())
    }

    /// Round-trip time in milliseconds
    pub fn duration_ms(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64() * 1000.0)
    }
}

//! Windowed health-history cache
//!
//! Ping samples live in a fast TTL-capable store so they expire on their
//! own once they leave the history window. Each instance also owns an
//! ordered side index of its sample keys and a last-success marker.
//!
//! # Architecture
//!
//! - **SampleCache**: the fast-store contract (atomic sample writes, index
//!   enumeration with lazy pruning, marker reads)
//! - **MemorySampleCache**: in-process implementation driven by a [`Clock`]
//! - **RedisSampleCache**: Redis implementation using server-side scripts
//! - **WindowedHealthCache**: reconciles the fast store with the durable
//!   [`HealthRepository`](crate::store::HealthRepository)
//!
//! # Key layout
//!
//! ```text
//! {prefix}sample:{instance}:{micros}   -> {"name": ..., "sample": ...}  (TTL)
//! {prefix}index:{instance}             -> sorted set, score = micros
//! {prefix}last_alive:{instance}        -> micros of last success
//! ```
//!
//! [`Clock`]: crate::clock::Clock

pub mod memory;
pub mod redis_cache;
pub mod windowed;

pub use memory::MemorySampleCache;
pub use redis_cache::RedisSampleCache;
pub use windowed::{WarmupReport, WindowedHealthCache};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use redis_monitoring_models::PingSample;

use crate::Result;

/// Identity of one cached sample
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    /// Instance the sample belongs to
    pub instance: String,

    /// Sample timestamp in microseconds since the Unix epoch
    pub timestamp_micros: i64,
}

impl SampleKey {
    pub fn new(instance: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            instance: instance.into(),
            timestamp_micros: timestamp.timestamp_micros(),
        }
    }
}

/// Value stored for each sample
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSample {
    pub name: String,
    pub sample: PingSample,
}

impl CachedSample {
    pub fn new(name: impl Into<String>, sample: PingSample) -> Self {
        Self {
            name: name.into(),
            sample,
        }
    }

    pub fn key(&self) -> SampleKey {
        SampleKey::new(self.name.clone(), self.sample.timestamp)
    }
}

/// How a sample write treats an existing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace any existing entry
    Upsert,

    /// Apply only if no entry exists for the key
    IfAbsent,
}

/// Fast, TTL-capable sample store.
///
/// Implementations must apply `write_sample` atomically: the value, its
/// index entry and the marker update land together or not at all.
/// Instances are independent; no cross-instance locking is required.
#[async_trait]
pub trait SampleCache: Send + Sync {
    /// Store a sample with the given time-to-live and register it in the
    /// instance index. A successful sample also advances the instance's
    /// last-success marker; the marker never moves backwards.
    ///
    /// Returns `false` when nothing was applied (`IfAbsent` on an existing key).
    async fn write_sample(&self, entry: &CachedSample, ttl: Duration, mode: WriteMode) -> Result<bool>;

    /// Drop index entries older than `window_start` and return the rest,
    /// ordered by timestamp. Prune and read are one atomic step.
    async fn live_index(&self, instance: &str, window_start: DateTime<Utc>) -> Result<Vec<SampleKey>>;

    /// Fetch sample values. Keys whose values already expired are skipped.
    async fn fetch_samples(&self, keys: &[SampleKey]) -> Result<Vec<CachedSample>>;

    /// Read the last-success marker
    async fn last_success(&self, instance: &str) -> Result<Option<DateTime<Utc>>>;

    /// Advance the last-success marker to `timestamp` if it is newer
    async fn restore_last_success(&self, instance: &str, timestamp: DateTime<Utc>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sample_key_uses_micros() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        let key = SampleKey::new("redis-a", ts);
        assert_eq!(key.timestamp_micros, ts.timestamp() * 1_000_000);

        let entry = CachedSample::new("redis-a", PingSample::failure(ts));
        assert_eq!(entry.key(), key);
    }
}

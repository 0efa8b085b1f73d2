//! In-process sample cache
//!
//! Keeps values, indexes and markers behind one mutex, so every operation
//! is atomic. Expiry follows the injected clock, which makes this backend
//! suitable for development setups and deterministic tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{CachedSample, SampleCache, SampleKey, WriteMode};
use crate::clock::Clock;
use crate::{MonitoringError, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: CachedSample,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }
}

#[derive(Debug, Default)]
struct Inner {
    samples: HashMap<SampleKey, Entry>,
    indexes: HashMap<String, BTreeSet<i64>>,
    markers: HashMap<String, DateTime<Utc>>,
}

impl Inner {
    /// Drop index entries older than `start` together with their values
    fn prune_before(&mut self, instance: &str, start: i64) -> usize {
        let Some(index) = self.indexes.get_mut(instance) else {
            return 0;
        };

        let kept = index.split_off(&start);
        let pruned = std::mem::replace(index, kept);
        for &timestamp_micros in &pruned {
            self.samples.remove(&SampleKey {
                instance: instance.to_string(),
                timestamp_micros,
            });
        }
        pruned.len()
    }

    /// Drop the oldest entries of an instance for as long as their values are expired
    fn purge_expired(&mut self, instance: &str, now: DateTime<Utc>) -> usize {
        let Some(index) = self.indexes.get_mut(instance) else {
            return 0;
        };

        let mut removed = 0;
        while let Some(&timestamp_micros) = index.first() {
            let key = SampleKey {
                instance: instance.to_string(),
                timestamp_micros,
            };
            if self.samples.get(&key).map_or(false, |e| e.is_live(now)) {
                break;
            }
            self.samples.remove(&key);
            index.pop_first();
            removed += 1;
        }
        removed
    }
}

/// Memory-backed [`SampleCache`]
#[derive(Clone)]
pub struct MemorySampleCache {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl MemorySampleCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    /// Drop every value, index and marker, like a cache server restart
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        let count = inner.samples.len();
        *inner = Inner::default();
        debug!(entries_cleared = count, "Memory sample cache flushed");
    }

    /// Number of sample values that have not expired
    pub fn live_len(&self) -> usize {
        let now = self.clock.now();
        self.inner
            .lock()
            .samples
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    /// Number of index entries held for an instance, including stale ones
    pub fn index_len(&self, instance: &str) -> usize {
        self.inner
            .lock()
            .indexes
            .get(instance)
            .map_or(0, BTreeSet::len)
    }

    /// Remove values whose TTL has passed
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let before = inner.samples.len();
        inner.samples.retain(|_, e| e.is_live(now));
        before - inner.samples.len()
    }
}

#[async_trait]
impl SampleCache for MemorySampleCache {
    async fn write_sample(&self, entry: &CachedSample, ttl: Duration, mode: WriteMode) -> Result<bool> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| MonitoringError::cache(format!("TTL out of range: {:?}", ttl)))?;
        let now = self.clock.now();
        let key = entry.key();

        let mut inner = self.inner.lock();
        let purged = inner.purge_expired(&key.instance, now);
        if purged > 0 {
            debug!(instance = %key.instance, purged, "Dropped expired samples");
        }

        if mode == WriteMode::IfAbsent
            && inner.samples.get(&key).map_or(false, |e| e.is_live(now))
        {
            return Ok(false);
        }

        inner.samples.insert(
            key.clone(),
            Entry {
                value: entry.clone(),
                expires_at: now + ttl,
            },
        );
        inner
            .indexes
            .entry(key.instance.clone())
            .or_default()
            .insert(key.timestamp_micros);

        if entry.sample.is_success() {
            let marker = inner.markers.entry(entry.name.clone()).or_insert(entry.sample.timestamp);
            if entry.sample.timestamp > *marker {
                *marker = entry.sample.timestamp;
            }
        }

        Ok(true)
    }

    async fn live_index(&self, instance: &str, window_start: DateTime<Utc>) -> Result<Vec<SampleKey>> {
        let start = window_start.timestamp_micros();
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        inner.prune_before(instance, start);
        inner.purge_expired(instance, now);

        let Some(index) = inner.indexes.get(instance) else {
            return Ok(Vec::new());
        };
        Ok(index
            .iter()
            .map(|&timestamp_micros| SampleKey {
                instance: instance.to_string(),
                timestamp_micros,
            })
            .collect())
    }

    async fn fetch_samples(&self, keys: &[SampleKey]) -> Result<Vec<CachedSample>> {
        let now = self.clock.now();
        let inner = self.inner.lock();
        Ok(keys
            .iter()
            .filter_map(|key| inner.samples.get(key))
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
            .collect())
    }

    async fn last_success(&self, instance: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.inner.lock().markers.get(instance).copied())
    }

    async fn restore_last_success(&self, instance: &str, timestamp: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock();
        let marker = inner.markers.entry(instance.to_string()).or_insert(timestamp);
        if timestamp > *marker {
            *marker = timestamp;
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemorySampleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("MemorySampleCache")
            .field("samples", &inner.samples.len())
            .field("instances", &inner.indexes.len())
            .finish()
    }
}

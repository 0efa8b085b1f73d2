//! Per-instance health projection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{PingSample, Result};

/// Health of one monitored instance, rebuilt at read time from its samples.
///
/// `samples` is kept ordered by timestamp with at most one sample per
/// timestamp. `last_success_time` is the timestamp of the most recent
/// successful probe, which may be older than every sample in the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceHealth {
    /// Unique instance name
    pub name: String,

    /// Samples ordered by timestamp
    pub samples: Vec<PingSample>,

    /// Timestamp of the most recent successful probe
    pub last_success_time: Option<DateTime<Utc>>,
}

impl InstanceHealth {
    /// Create health with no samples
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            samples: Vec::new(),
            last_success_time: None,
        }
    }

    /// Create health from an unordered set of samples.
    ///
    /// Duplicates by timestamp are collapsed.
    pub fn from_samples(
        name: impl Into<String>,
        samples: impl IntoIterator<Item = PingSample>,
        last_success_time: Option<DateTime<Utc>>,
    ) -> Self {
        let mut health = Self::empty(name);
        for sample in samples {
            health.merge_sample(sample);
        }
        health.last_success_time = last_success_time;
        health
    }

    /// Insert a sample, replacing any sample with the same timestamp.
    ///
    /// Returns `true` if the sample was new.
    pub fn merge_sample(&mut self, sample: PingSample) -> bool {
        match self
            .samples
            .binary_search_by(|s| s.timestamp.cmp(&sample.timestamp))
        {
            Ok(idx) => {
                self.samples[idx] = sample;
                false
            }
            Err(idx) => {
                self.samples.insert(idx, sample);
                true
            }
        }
    }

    /// Move the last-success marker forward to `timestamp` if it is newer
    pub fn observe_success(&mut self, timestamp: DateTime<Utc>) {
        if self.last_success_time.map_or(true, |last| timestamp > last) {
            self.last_success_time = Some(timestamp);
        }
    }

    /// Drop samples older than `window_start`
    pub fn retain_window(&mut self, window_start: DateTime<Utc>) {
        self.samples.retain(|s| s.is_within(window_start));
    }

    /// Copy restricted to samples inside the window
    pub fn windowed(&self, window_start: DateTime<Utc>) -> Self {
        let mut health = self.clone();
        health.retain_window(window_start);
        health
    }

    /// Timestamp of the newest sample
    pub fn latest_sample_time(&self) -> Option<DateTime<Utc>> {
        self.samples.last().map(|s| s.timestamp)
    }

    /// Timestamp of the newest successful sample in the list
    pub fn latest_success_sample_time(&self) -> Option<DateTime<Utc>> {
        self.samples
            .iter()
            .rev()
            .find(|s| s.is_success())
            .map(|s| s.timestamp)
    }

    /// Alive when the newest sample is the last successful one
    pub fn is_alive(&self) -> bool {
        match (self.last_success_time, self.latest_sample_time()) {
            (Some(last_success), Some(latest)) => last_success == latest,
            _ => false,
        }
    }

    pub fn success_count(&self) -> usize {
        self.samples.iter().filter(|s| s.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.samples.len() - self.success_count()
    }

    /// Fraction of successful probes in the window
    pub fn availability(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.success_count() as f64 / self.samples.len() as f64)
        }
    }

    /// Mean round-trip time of successful probes
    pub fn average_duration(&self) -> Option<Duration> {
        let durations: Vec<Duration> = self.samples.iter().filter_map(|s| s.duration).collect();
        if durations.is_empty() {
            return None;
        }
        let total: Duration = durations.iter().sum();
        Some(total / durations.len() as u32)
    }

    /// Serialize the sample list for row-oriented storage
    pub fn samples_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.samples)?)
    }

    /// Rebuild health from a stored row
    pub fn from_row(
        name: impl Into<String>,
        samples_json: &str,
        last_success_time: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let samples: Vec<PingSample> = serde_json::from_str(samples_json)?;
        Ok(Self::from_samples(name, samples, last_success_time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, min, 0).unwrap()
    }

    #[test]
    fn test_merge_is_idempotent_and_ordered() {
        let mut health = InstanceHealth::empty("r1");
        assert!(health.merge_sample(PingSample::failure(at(5))));
        assert!(health.merge_sample(PingSample::success(at(0), Duration::from_millis(5))));
        assert!(!health.merge_sample(PingSample::failure(at(5))));

        let times: Vec<_> = health.samples.iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![at(0), at(5)]);
    }

    #[test]
    fn test_is_alive() {
        let mut health = InstanceHealth::empty("r1");
        assert!(!health.is_alive());

        health.merge_sample(PingSample::success(at(1), Duration::from_millis(2)));
        health.observe_success(at(1));
        assert!(health.is_alive());

        health.merge_sample(PingSample::failure(at(2)));
        assert!(!health.is_alive());
    }

    #[test]
    fn test_observe_success_never_regresses() {
        let mut health = InstanceHealth::empty("r1");
        health.observe_success(at(5));
        health.observe_success(at(3));
        assert_eq!(health.last_success_time, Some(at(5)));
    }

    #[test]
    fn test_retain_window_closed_lower_bound() {
        let health = InstanceHealth::from_samples(
            "r1",
            vec![
                PingSample::failure(at(0)),
                PingSample::failure(at(1)),
                PingSample::failure(at(2)),
            ],
            None,
        );
        let windowed = health.windowed(at(1));
        assert_eq!(windowed.samples.len(), 2);
        assert_eq!(windowed.samples[0].timestamp, at(1));
    }

    #[test]
    fn test_aggregates() {
        let health = InstanceHealth::from_samples(
            "r1",
            vec![
                PingSample::success(at(0), Duration::from_millis(4)),
                PingSample::failure(at(1)),
                PingSample::success(at(2), Duration::from_millis(8)),
                PingSample::failure(at(3)),
            ],
            Some(at(2)),
        );
        assert_eq!(health.success_count(), 2);
        assert_eq!(health.failure_count(), 2);
        assert_eq!(health.availability(), Some(0.5));
        assert_eq!(health.average_duration(), Some(Duration::from_millis(6)));
        assert_eq!(health.latest_success_sample_time(), Some(at(2)));
        assert!(InstanceHealth::empty("r2").availability().is_none());
    }

    #[test]
    fn test_row_roundtrip() {
        let health = InstanceHealth::from_samples(
            "r1",
            vec![PingSample::success(at(0), Duration::from_millis(4))],
            Some(at(0)),
        );
        let json = health.samples_json().unwrap();
        let restored = InstanceHealth::from_row("r1", &json, Some(at(0))).unwrap();
        assert_eq!(restored, health);
    }
}

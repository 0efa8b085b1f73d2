//! Metric names and recording helpers.
//!
//! Everything goes through the `metrics` facade; nothing is exported unless
//! the binary installs a recorder.

use metrics::{describe_counter, describe_histogram, histogram, increment_counter, Unit};
use std::time::Duration;

pub const PROBE_DURATION: &str = "redis_monitoring_probe_duration_seconds";
pub const PROBE_FAILURES: &str = "redis_monitoring_probe_failures_total";
pub const CACHE_WRITE_FAILURES: &str = "redis_monitoring_cache_write_failures_total";
pub const CACHE_READ_FAILURES: &str = "redis_monitoring_cache_read_failures_total";
pub const DURABLE_FALLBACKS: &str = "redis_monitoring_durable_fallbacks_total";
pub const COLD_CACHE_READS: &str = "redis_monitoring_cold_cache_reads_total";
pub const WARMUP_FAILURES: &str = "redis_monitoring_warmup_failures_total";
pub const TICK_FAILURES: &str = "redis_monitoring_tick_failures_total";

/// Register metric descriptions. Called once by the binary after the
/// recorder is installed.
pub fn describe_metrics() {
    describe_histogram!(PROBE_DURATION, Unit::Seconds, "Round-trip time of successful probes");
    describe_counter!(PROBE_FAILURES, "Probes that reported an instance as not responding");
    describe_counter!(CACHE_WRITE_FAILURES, "Sample writes rejected by the fast cache");
    describe_counter!(CACHE_READ_FAILURES, "Fast cache reads that failed and fell back");
    describe_counter!(DURABLE_FALLBACKS, "Per-instance reads served from the durable store");
    describe_counter!(COLD_CACHE_READS, "Full reads served from the durable store because the cache was empty");
    describe_counter!(WARMUP_FAILURES, "Samples that could not be restored during warm-up");
    describe_counter!(TICK_FAILURES, "Scheduler ticks aborted by an error");
}

pub(crate) fn record_probe(instance: &str, duration: Option<Duration>) {
    match duration {
        Some(d) => histogram!(PROBE_DURATION, d.as_secs_f64(), "instance" => instance.to_string()),
        None => increment_counter!(PROBE_FAILURES, "instance" => instance.to_string()),
    }
}

pub(crate) fn record_cache_write_failure(instance: &str) {
    increment_counter!(CACHE_WRITE_FAILURES, "instance" => instance.to_string());
}

pub(crate) fn record_cache_read_failure(instance: &str) {
    increment_counter!(CACHE_READ_FAILURES, "instance" => instance.to_string());
}

pub(crate) fn record_durable_fallback(instance: &str) {
    increment_counter!(DURABLE_FALLBACKS, "instance" => instance.to_string());
}

pub(crate) fn record_cold_cache_read() {
    increment_counter!(COLD_CACHE_READS);
}

pub(crate) fn record_warmup_failure(instance: &str) {
    increment_counter!(WARMUP_FAILURES, "instance" => instance.to_string());
}

pub(crate) fn record_tick_failure(category: &'static str) {
    increment_counter!(TICK_FAILURES, "category" => category);
}

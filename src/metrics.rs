// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the repository.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The embedding application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `layered_repository_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `tier`: read_through, write_through, write_behind, timed
//! - `operation`: get, set, delete, mget, mset, mdelete, getall, find, sync
//! - `datasource`: backend kind (memory, json_file, ...)

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a repository operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "layered_repository_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "layered_repository_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a datasource failure that was absorbed by a fallback path
pub fn record_fallback(operation: &str, datasource: &str) {
    counter!(
        "layered_repository_fallbacks_total",
        "operation" => operation.to_string(),
        "datasource" => datasource.to_string()
    )
    .increment(1);
}

/// Record a datasource error, absorbed or not
pub fn record_datasource_error(datasource: &str, operation: &str) {
    counter!(
        "layered_repository_datasource_errors_total",
        "datasource" => datasource.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a sync drain
pub fn record_sync(applied: usize, removed: usize, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "layered_repository_sync_total",
        "status" => status
    )
    .increment(1);

    if success {
        counter!("layered_repository_sync_applied_total").increment(applied as u64);
        counter!("layered_repository_sync_removed_total").increment(removed as u64);
    }
}

/// Set the number of entries waiting in the write-behind cache
pub fn set_sync_pending(count: usize) {
    gauge!("layered_repository_sync_pending").set(count as f64);
}

/// Record a timer-driven sync tick
pub fn record_timed_sync(status: &str) {
    counter!(
        "layered_repository_timed_sync_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only verify the API doesn't panic without an installed recorder.

    #[test]
    fn test_record_operation() {
        record_operation("write_through", "set", "success");
        record_operation("write_behind", "sync", "error");
    }

    #[test]
    fn test_record_latency() {
        record_latency("read_through", "get", Duration::from_micros(100));
        record_latency("write_behind", "sync", Duration::from_millis(5));
    }

    #[test]
    fn test_fallback_and_errors() {
        record_fallback("get", "memory");
        record_datasource_error("json_file", "mset");
    }

    #[test]
    fn test_sync_metrics() {
        record_sync(10, 2, true);
        record_sync(0, 0, false);
        set_sync_pending(42);
        record_timed_sync("success");
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("read_through", "get");
            std::thread::sleep(Duration::from_micros(10));
        }
    }
}

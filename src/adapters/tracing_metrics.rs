//! Metrics sink that emits `tracing` events.

use crate::ports::metrics_port::MetricsPort;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsPort for TracingMetrics {
    fn increment(&self, name: &str, value: u64) {
        info!(target: "stockpulse::metrics", metric = name, value, "counter");
    }

    fn timing(&self, name: &str, elapsed: Duration) {
        info!(
            target: "stockpulse::metrics",
            metric = name,
            elapsed_ms = elapsed.as_millis() as u64,
            "timing"
        );
    }
}

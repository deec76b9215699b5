//! Metrics sink port.

use std::time::Duration;

pub trait MetricsPort {
    fn increment(&self, name: &str, value: u64);
    fn timing(&self, name: &str, elapsed: Duration);
}

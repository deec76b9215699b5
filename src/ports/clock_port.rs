//! Time source port.
//!
//! The retry policy and the orchestrator read time and sleep through this
//! trait so tests can run without real delays.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

pub trait Clock {
    /// Monotonic time for deadlines and elapsed-time measurement.
    fn now(&self) -> Instant;
    /// Wall-clock time stamped onto results.
    fn utc_now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: Duration);
}

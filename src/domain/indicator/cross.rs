//! Golden / dead cross detection.

use crate::domain::indicator::MovingAverages;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossSignal {
    Golden,
    Dead,
    None,
}

/// Golden when the short average moves from at-or-below the long average to
/// above it, dead for the mirror move. A pair that merely stays apart is
/// `None`.
pub fn detect_cross(
    short: f64,
    long: f64,
    previous_short: f64,
    previous_long: f64,
) -> CrossSignal {
    if previous_short <= previous_long && short > long {
        CrossSignal::Golden
    } else if previous_short >= previous_long && short < long {
        CrossSignal::Dead
    } else {
        CrossSignal::None
    }
}

impl MovingAverages {
    /// `None` when the previous bar's averages are not available.
    pub fn cross(&self) -> Option<CrossSignal> {
        self.previous
            .map(|(prev_short, prev_long)| detect_cross(self.short, self.long, prev_short, prev_long))
    }
}

//! Support and resistance levels.
//!
//! Resistance is the highest close and support the lowest close within the
//! lookback window (the whole series when the lookback is 0). Trend-line
//! fitting is not attempted.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{require_len, IndicatorKind};
use serde::Serialize;

/// 0 selects the full supplied history.
pub const DEFAULT_LOOKBACK: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SupportResistance {
    pub support: f64,
    pub resistance: f64,
}

impl SupportResistance {
    pub fn resistance_broken(&self, price: f64) -> bool {
        price > self.resistance
    }

    pub fn support_broken(&self, price: f64) -> bool {
        price < self.support
    }
}

pub fn support_resistance(
    values: &[f64],
    lookback: usize,
) -> Result<SupportResistance, IndicatorError> {
    let kind = IndicatorKind::SupportResistance(lookback);
    let window = if lookback == 0 {
        require_len(kind, values, 2)?;
        values
    } else {
        require_len(kind, values, lookback)?;
        &values[values.len() - lookback..]
    };

    Ok(SupportResistance {
        support: window.iter().copied().fold(f64::INFINITY, f64::min),
        resistance: window.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    })
}

//! Bollinger Bands over the latest `period` closes.
//!
//! - Middle: simple average of the window
//! - Upper: middle + multiplier * stddev
//! - Lower: middle - multiplier * stddev
//!
//! StdDev is the population deviation (divides by N). The multiplier is
//! carried as hundredths so the indicator kind stays hashable.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{mean, require_len, require_period, IndicatorKind};
use serde::Serialize;

pub const DEFAULT_PERIOD: usize = 20;
pub const DEFAULT_STDDEV_MULT_X100: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

impl BollingerBands {
    /// Where `price` sits in the band: 0 at the lower band, 1 at the upper.
    /// `None` for a zero-width band.
    pub fn percent_b(&self, price: f64) -> Option<f64> {
        let width = self.upper - self.lower;
        (width > 0.0).then(|| (price - self.lower) / width)
    }
}

pub fn bollinger(
    values: &[f64],
    period: usize,
    stddev_mult_x100: u32,
) -> Result<BollingerBands, IndicatorError> {
    let kind = IndicatorKind::Bollinger {
        period,
        stddev_mult_x100,
    };
    require_period(kind, period)?;
    require_len(kind, values, period)?;

    let window = &values[values.len() - period..];
    let middle = mean(window);
    let variance = window
        .iter()
        .map(|v| {
            let diff = v - middle;
            diff * diff
        })
        .sum::<f64>()
        / period as f64;
    let spread = f64::from(stddev_mult_x100) / 100.0 * variance.sqrt();

    Ok(BollingerBands {
        upper: middle + spread,
        middle,
        lower: middle - spread,
    })
}

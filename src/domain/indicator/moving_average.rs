//! Simple moving averages.
//!
//! SMA(n) = mean of the most recent n values. The pair of short/long averages
//! also carries the previous bar's averages (when one more point is
//! available) so cross detection can compare consecutive bars.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{mean, require_len, require_period, IndicatorKind};

pub const DEFAULT_SHORT: usize = 25;
pub const DEFAULT_LONG: usize = 75;

pub fn sma(values: &[f64], period: usize) -> Result<f64, IndicatorError> {
    let kind = IndicatorKind::Sma(period);
    require_period(kind, period)?;
    require_len(kind, values, period)?;
    Ok(mean(&values[values.len() - period..]))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovingAverages {
    pub short: f64,
    pub long: f64,
    pub previous: Option<(f64, f64)>,
}

pub fn moving_averages(
    values: &[f64],
    short: usize,
    long: usize,
) -> Result<MovingAverages, IndicatorError> {
    let kind = IndicatorKind::MovingAverages { short, long };
    require_period(kind, short)?;
    if short >= long {
        return Err(IndicatorError::malformed(
            kind,
            "short window must be smaller than long window",
        ));
    }
    require_len(kind, values, long)?;

    let previous = if values.len() > long {
        let prior = &values[..values.len() - 1];
        Some((sma(prior, short)?, sma(prior, long)?))
    } else {
        None
    };

    Ok(MovingAverages {
        short: sma(values, short)?,
        long: sma(values, long)?,
        previous,
    })
}

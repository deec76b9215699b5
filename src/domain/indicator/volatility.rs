//! Return volatility.
//!
//! Sample standard deviation of daily percentage returns:
//! R[i] = (C[i] / C[i-1] - 1) * 100, VOL = sqrt(sum((R - mean(R))^2) / (n - 1)).
//! Needs at least 3 prices. A return whose base close is 0 is undefined and
//! skipped; fewer than 2 usable returns is insufficient data.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{mean, require_len, IndicatorKind};

pub fn return_volatility(values: &[f64]) -> Result<f64, IndicatorError> {
    let kind = IndicatorKind::Volatility;
    require_len(kind, values, 3)?;

    let returns: Vec<f64> = values
        .windows(2)
        .filter(|pair| pair[0] != 0.0)
        .map(|pair| (pair[1] / pair[0] - 1.0) * 100.0)
        .collect();
    if returns.len() < 2 {
        return Err(IndicatorError::insufficient(kind, returns.len() + 1, 3));
    }

    let avg = mean(&returns);
    let variance = returns
        .iter()
        .map(|r| {
            let diff = r - avg;
            diff * diff
        })
        .sum::<f64>()
        / (returns.len() - 1) as f64;

    Ok(variance.sqrt())
}

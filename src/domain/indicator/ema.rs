//! Exponential Moving Average.
//!
//! k = 2/(n+1), seed with the SMA of the first n values, then
//! EMA[i] = V[i]*k + EMA[i-1]*(1-k).

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{mean, require_len, require_period, IndicatorKind};

/// EMA values from the seed point onward: element 0 corresponds to
/// `values[period - 1]`, so the result has `len - period + 1` entries.
pub fn ema_series(values: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    let kind = IndicatorKind::Ema(period);
    require_period(kind, period)?;
    require_len(kind, values, period)?;

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = mean(&values[..period]);
    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(ema);

    for &v in &values[period..] {
        ema = v * k + ema * (1.0 - k);
        out.push(ema);
    }
    Ok(out)
}

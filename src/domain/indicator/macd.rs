//! MACD (Moving Average Convergence Divergence).
//!
//! MACD Line = EMA(fast) - EMA(slow)
//! Signal Line = EMA(signal) of MACD Line
//! Histogram = MACD Line - Signal Line
//!
//! Default parameters: fast=12, slow=26, signal=9
//! Needs slow + signal - 1 values for the first signal point.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{
    ema_series, require_len, require_period, IndicatorKind, TechnicalSignal,
};
use serde::Serialize;

pub const DEFAULT_FAST: usize = 12;
pub const DEFAULT_SLOW: usize = 26;
pub const DEFAULT_SIGNAL: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
    /// Line crossed the signal between the previous and latest bar.
    pub crossed: bool,
    pub classification: TechnicalSignal,
}

pub fn macd(
    values: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> Result<Macd, IndicatorError> {
    let kind = IndicatorKind::Macd {
        fast,
        slow,
        signal: signal_period,
    };
    require_period(kind, fast)?;
    require_period(kind, signal_period)?;
    if fast >= slow {
        return Err(IndicatorError::malformed(
            kind,
            "fast period must be smaller than slow period",
        ));
    }
    require_len(kind, values, slow + signal_period - 1)?;

    let ema_fast = ema_series(values, fast)?;
    let ema_slow = ema_series(values, slow)?;

    // Both EMA vectors end at the latest value; line starts at values[slow - 1].
    let offset = slow - fast;
    let line: Vec<f64> = ema_slow
        .iter()
        .enumerate()
        .map(|(i, s)| ema_fast[i + offset] - s)
        .collect();
    let signal = ema_series(&line, signal_period)?;

    let last_line = line[line.len() - 1];
    let last_signal = signal[signal.len() - 1];

    let crossed = if signal.len() >= 2 {
        let prev_diff = line[line.len() - 2] - signal[signal.len() - 2];
        let diff = last_line - last_signal;
        (prev_diff <= 0.0 && diff > 0.0) || (prev_diff >= 0.0 && diff < 0.0)
    } else {
        false
    };

    let classification = if last_line > last_signal {
        TechnicalSignal::Bullish
    } else if last_line < last_signal {
        TechnicalSignal::Bearish
    } else {
        TechnicalSignal::Neutral
    };

    Ok(Macd {
        line: last_line,
        signal: last_signal,
        histogram: last_line - last_signal,
        crossed,
        classification,
    })
}

pub fn macd_default(values: &[f64]) -> Result<Macd, IndicatorError> {
    macd(values, DEFAULT_FAST, DEFAULT_SLOW, DEFAULT_SIGNAL)
}

//! Breakout detection against the most recent `lookback` reference prices,
//! plus the longest of several lookbacks over which the current price is a
//! new high or low.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{require_len, require_period, IndicatorKind};
use serde::Serialize;

pub const DEFAULT_LOOKBACK: usize = 20;
pub const EXTREME_LOOKBACKS: [usize; 4] = [20, 50, 100, 200];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Breakout {
    pub new_high: bool,
    pub new_low: bool,
}

/// `reference` must not contain the current price. Ties with the window
/// extreme are not breaks.
pub fn detect_breakout(
    current: f64,
    reference: &[f64],
    lookback: usize,
) -> Result<Breakout, IndicatorError> {
    let kind = IndicatorKind::Breakout(lookback);
    require_period(kind, lookback)?;
    require_len(kind, reference, lookback)?;

    let window = &reference[reference.len() - lookback..];
    let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = window.iter().copied().fold(f64::INFINITY, f64::min);

    Ok(Breakout {
        new_high: current > max,
        new_low: current < min,
    })
}

/// Longest lookback (in bars) the current price exceeds on each side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ExtremeSpan {
    pub high_days: Option<usize>,
    pub low_days: Option<usize>,
}

/// Lookbacks longer than the reference history are skipped; when even the
/// shortest one does not fit the result is insufficient data.
pub fn detect_extremes(
    current: f64,
    reference: &[f64],
    lookbacks: &[usize],
) -> Result<ExtremeSpan, IndicatorError> {
    let shortest = lookbacks.iter().copied().min().unwrap_or(0);
    let kind = IndicatorKind::Extremes(shortest);
    require_period(kind, shortest)?;
    require_len(kind, reference, shortest)?;

    let mut span = ExtremeSpan::default();
    for &lookback in lookbacks.iter().filter(|l| **l <= reference.len()) {
        let b = detect_breakout(current, reference, lookback)?;
        if b.new_high && span.high_days.is_none_or(|d| d < lookback) {
            span.high_days = Some(lookback);
        }
        if b.new_low && span.low_days.is_none_or(|d| d < lookback) {
            span.low_days = Some(lookback);
        }
    }
    Ok(span)
}

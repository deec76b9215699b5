//! RSI (Relative Strength Index).
//!
//! Uses Wilder's smoothing for average gain/loss calculation:
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100.
//! If both averages are 0 (flat series): RSI = 50.
//!
//! Needs n + 1 values (n price changes).

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{require_len, require_period, IndicatorKind};

pub const DEFAULT_PERIOD: usize = 14;
pub const OVERBOUGHT: f64 = 70.0;
pub const OVERSOLD: f64 = 30.0;

pub fn rsi(values: &[f64], period: usize) -> Result<f64, IndicatorError> {
    let kind = IndicatorKind::Rsi(period);
    require_period(kind, period)?;
    require_len(kind, values, period + 1)?;

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, pair) in values.windows(2).enumerate() {
        let change = pair[1] - pair[0];
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { -change } else { 0.0 };

        if i < period {
            avg_gain += gain / period as f64;
            avg_loss += loss / period as f64;
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        }
    }

    let value = if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    };
    Ok(value.clamp(0.0, 100.0))
}

//! Technical indicator engine.
//!
//! Pure functions over `&[f64]` slices, oldest value first. Every function
//! returns [`IndicatorError::InsufficientData`] when the input is shorter
//! than its minimum window, so callers can tell "not enough history yet"
//! apart from a computed value.
//!
//! - `moving_average`: short/long simple averages with previous-bar values
//! - `cross`: golden/dead cross classification
//! - `breakout`: new-high / new-low breaks against a lookback window, and
//!   the longest of several lookbacks the current price is an extreme for
//! - `bollinger`: Bollinger Bands around a simple average
//! - `support_resistance`: local extrema over a lookback window
//! - `rsi`, `ema`, `macd`: momentum
//! - `correlation`: Pearson correlation against a reference series
//! - `volume`: volume change rate against the historical mean
//! - `volatility`: standard deviation of daily returns

pub mod bollinger;
pub mod breakout;
pub mod correlation;
pub mod cross;
pub mod ema;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod support_resistance;
pub mod volatility;
pub mod volume;

pub use bollinger::{bollinger, BollingerBands};
pub use breakout::{detect_breakout, detect_extremes, Breakout, ExtremeSpan};
pub use correlation::correlation;
pub use cross::{detect_cross, CrossSignal};
pub use ema::ema_series;
pub use macd::{macd, Macd};
pub use moving_average::{moving_averages, sma, MovingAverages};
pub use rsi::rsi;
pub use support_resistance::{support_resistance, SupportResistance};
pub use volatility::return_volatility;
pub use volume::volume_change_rate;

use crate::domain::error::IndicatorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction an indicator points in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TechnicalSignal {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl fmt::Display for TechnicalSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TechnicalSignal::Bullish => write!(f, "BULLISH"),
            TechnicalSignal::Bearish => write!(f, "BEARISH"),
            TechnicalSignal::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Indicator identity plus parameters, used in error messages and in the
/// list of unavailable indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma(usize),
    Ema(usize),
    MovingAverages { short: usize, long: usize },
    Breakout(usize),
    /// Keyed by the shortest lookback.
    Extremes(usize),
    SupportResistance(usize),
    Rsi(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    Correlation,
    VolumeChange,
    Volatility,
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Sma(period) => write!(f, "SMA({})", period),
            IndicatorKind::Ema(period) => write!(f, "EMA({})", period),
            IndicatorKind::MovingAverages { short, long } => write!(f, "MA({},{})", short, long),
            IndicatorKind::Breakout(lookback) => write!(f, "BREAKOUT({})", lookback),
            IndicatorKind::Extremes(lookback) => write!(f, "EXTREMES({})", lookback),
            IndicatorKind::SupportResistance(0) => write!(f, "SUPPORT_RESISTANCE(ALL)"),
            IndicatorKind::SupportResistance(lookback) => {
                write!(f, "SUPPORT_RESISTANCE({})", lookback)
            }
            IndicatorKind::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorKind::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorKind::Bollinger {
                period,
                stddev_mult_x100,
            } => write!(
                f,
                "BOLLINGER({},{:.2})",
                period,
                f64::from(*stddev_mult_x100) / 100.0
            ),
            IndicatorKind::Correlation => write!(f, "CORRELATION"),
            IndicatorKind::VolumeChange => write!(f, "VOLUME_CHANGE"),
            IndicatorKind::Volatility => write!(f, "VOLATILITY"),
        }
    }
}

pub(crate) fn require_len(
    kind: IndicatorKind,
    values: &[f64],
    need: usize,
) -> Result<(), IndicatorError> {
    if values.len() < need {
        return Err(IndicatorError::insufficient(kind, values.len(), need));
    }
    Ok(())
}

pub(crate) fn require_period(kind: IndicatorKind, period: usize) -> Result<(), IndicatorError> {
    if period == 0 {
        return Err(IndicatorError::malformed(kind, "period must be at least 1"));
    }
    Ok(())
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

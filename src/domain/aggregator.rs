//! Per-instrument indicator aggregation.
//!
//! Runs the indicator engine over one [`InstrumentSnapshot`] and assembles a
//! [`TechnicalIndicators`] record. An indicator that lacks history is listed
//! in `unavailable` and left as `None`; malformed input fails the instrument.

use crate::domain::error::{IndicatorError, PulseError};
use crate::domain::indicator::{
    self, bollinger, breakout, macd, moving_average, rsi, support_resistance, BollingerBands,
    CrossSignal, IndicatorKind, Macd, SupportResistance, TechnicalSignal,
};
use crate::domain::instrument::InstrumentSnapshot;
use crate::domain::series::PriceSeries;
use crate::ports::metrics_port::MetricsPort;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

/// Volume change (percent) beyond which the volume trend counts as a signal.
pub const VOLUME_TREND_THRESHOLD: f64 = 20.0;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    pub short_window: usize,
    pub long_window: usize,
    pub breakout_lookback: usize,
    /// 0 uses the full history.
    pub support_resistance_lookback: usize,
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bollinger_period: usize,
    /// Band width in hundredths of a standard deviation (200 = 2.0).
    pub bollinger_stddev_x100: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            short_window: moving_average::DEFAULT_SHORT,
            long_window: moving_average::DEFAULT_LONG,
            breakout_lookback: breakout::DEFAULT_LOOKBACK,
            support_resistance_lookback: support_resistance::DEFAULT_LOOKBACK,
            rsi_period: rsi::DEFAULT_PERIOD,
            macd_fast: macd::DEFAULT_FAST,
            macd_slow: macd::DEFAULT_SLOW,
            macd_signal: macd::DEFAULT_SIGNAL,
            bollinger_period: bollinger::DEFAULT_PERIOD,
            bollinger_stddev_x100: bollinger::DEFAULT_STDDEV_MULT_X100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Unavailable {
    pub indicator: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechnicalIndicators {
    pub symbol: String,
    pub short_ma: Option<f64>,
    pub long_ma: Option<f64>,
    pub golden_cross: bool,
    pub dead_cross: bool,
    pub new_high_break: bool,
    pub new_low_break: bool,
    /// Longest of `breakout::EXTREME_LOOKBACKS` the price is a new high for.
    pub new_high_days: Option<usize>,
    pub new_low_days: Option<usize>,
    pub levels: Option<SupportResistance>,
    pub resistance_break: bool,
    pub support_break: bool,
    pub rsi: Option<f64>,
    pub macd: Option<Macd>,
    pub bollinger: Option<BollingerBands>,
    pub market_correlation: Option<f64>,
    pub volume_change_rate: Option<f64>,
    pub volatility: Option<f64>,
    pub unavailable: Vec<Unavailable>,
}

impl TechnicalIndicators {
    fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            short_ma: None,
            long_ma: None,
            golden_cross: false,
            dead_cross: false,
            new_high_break: false,
            new_low_break: false,
            new_high_days: None,
            new_low_days: None,
            levels: None,
            resistance_break: false,
            support_break: false,
            rsi: None,
            macd: None,
            bollinger: None,
            market_correlation: None,
            volume_change_rate: None,
            volatility: None,
            unavailable: Vec::new(),
        }
    }

    pub fn is_unavailable(&self, indicator: &str) -> bool {
        self.unavailable.iter().any(|u| u.indicator == indicator)
    }

    /// Overbought RSI reads bearish, oversold bullish.
    pub fn rsi_signal(&self) -> TechnicalSignal {
        match self.rsi {
            Some(v) if v > rsi::OVERBOUGHT => TechnicalSignal::Bearish,
            Some(v) if v < rsi::OVERSOLD => TechnicalSignal::Bullish,
            _ => TechnicalSignal::Neutral,
        }
    }

    pub fn macd_trend(&self) -> TechnicalSignal {
        self.macd.map(|m| m.classification).unwrap_or_default()
    }

    pub fn volume_trend(&self) -> TechnicalSignal {
        match self.volume_change_rate {
            Some(v) if v > VOLUME_TREND_THRESHOLD => TechnicalSignal::Bullish,
            Some(v) if v < -VOLUME_TREND_THRESHOLD => TechnicalSignal::Bearish,
            _ => TechnicalSignal::Neutral,
        }
    }

    /// Weighted vote: crosses count twice, every other signal once. One side
    /// must lead by more than one vote.
    pub fn overall_signal(&self) -> TechnicalSignal {
        let mut bullish = 0;
        let mut bearish = 0;

        if self.golden_cross {
            bullish += 2;
        }
        if self.dead_cross {
            bearish += 2;
        }
        if self.new_high_break || self.resistance_break {
            bullish += 1;
        }
        if self.new_low_break || self.support_break {
            bearish += 1;
        }
        for signal in [self.rsi_signal(), self.macd_trend(), self.volume_trend()] {
            match signal {
                TechnicalSignal::Bullish => bullish += 1,
                TechnicalSignal::Bearish => bearish += 1,
                TechnicalSignal::Neutral => {}
            }
        }

        if bullish > bearish + 1 {
            TechnicalSignal::Bullish
        } else if bearish > bullish + 1 {
            TechnicalSignal::Bearish
        } else {
            TechnicalSignal::Neutral
        }
    }
}

/// Records insufficient data as unavailable; passes malformed input up.
fn absorb<T>(
    result: Result<T, IndicatorError>,
    unavailable: &mut Vec<Unavailable>,
) -> Result<Option<T>, PulseError> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(IndicatorError::InsufficientData {
            indicator,
            have,
            need,
        }) => {
            unavailable.push(Unavailable {
                indicator,
                reason: format!("have {have} points, need {need}"),
            });
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

fn mark_missing(unavailable: &mut Vec<Unavailable>, kind: IndicatorKind, reason: &str) {
    unavailable.push(Unavailable {
        indicator: kind.to_string(),
        reason: reason.to_string(),
    });
}

pub fn compute_indicators(
    snapshot: &InstrumentSnapshot,
    market: Option<&PriceSeries>,
    config: &IndicatorConfig,
) -> Result<TechnicalIndicators, PulseError> {
    let mut out = TechnicalIndicators::empty(&snapshot.symbol);
    let current = snapshot.current_price;

    if let (Some(prices), Some(volumes)) = (&snapshot.price_history, &snapshot.volume_history) {
        if prices.len() != volumes.len() {
            return Err(PulseError::malformed(format!(
                "{}: price history has {} points but volume history has {}",
                snapshot.symbol,
                prices.len(),
                volumes.len()
            )));
        }
    }

    match &snapshot.price_history {
        Some(history) => {
            let closes = history.values();
            // Reference windows exclude the current bar.
            let reference = &closes[..closes.len().saturating_sub(1)];
            let unavailable = &mut out.unavailable;

            if let Some(ma) = absorb(
                indicator::moving_averages(closes, config.short_window, config.long_window),
                unavailable,
            )? {
                out.short_ma = Some(ma.short);
                out.long_ma = Some(ma.long);
                match ma.cross() {
                    Some(CrossSignal::Golden) => out.golden_cross = true,
                    Some(CrossSignal::Dead) => out.dead_cross = true,
                    Some(CrossSignal::None) => {}
                    None => mark_missing(
                        unavailable,
                        IndicatorKind::MovingAverages {
                            short: config.short_window,
                            long: config.long_window,
                        },
                        "no previous bar for cross detection",
                    ),
                }
            }

            if let Some(b) = absorb(
                indicator::detect_breakout(current, reference, config.breakout_lookback),
                unavailable,
            )? {
                out.new_high_break = b.new_high;
                out.new_low_break = b.new_low;
            }

            if let Some(span) = absorb(
                indicator::detect_extremes(current, reference, &breakout::EXTREME_LOOKBACKS),
                unavailable,
            )? {
                out.new_high_days = span.high_days;
                out.new_low_days = span.low_days;
            }

            if let Some(levels) = absorb(
                indicator::support_resistance(reference, config.support_resistance_lookback),
                unavailable,
            )? {
                out.resistance_break = levels.resistance_broken(current);
                out.support_break = levels.support_broken(current);
                out.levels = Some(levels);
            }

            out.rsi = absorb(indicator::rsi(closes, config.rsi_period), unavailable)?;
            out.macd = absorb(
                indicator::macd(closes, config.macd_fast, config.macd_slow, config.macd_signal),
                unavailable,
            )?;
            out.bollinger = absorb(
                indicator::bollinger(closes, config.bollinger_period, config.bollinger_stddev_x100),
                unavailable,
            )?;
            out.volatility = absorb(indicator::return_volatility(closes), unavailable)?;

            match market {
                Some(reference_series) => {
                    let (own, other) = history.align(reference_series);
                    out.market_correlation =
                        absorb(indicator::correlation(&own, &other), unavailable)?;
                }
                None => mark_missing(unavailable, IndicatorKind::Correlation, "no market series"),
            }
        }
        None => {
            let unavailable = &mut out.unavailable;
            for kind in [
                IndicatorKind::MovingAverages {
                    short: config.short_window,
                    long: config.long_window,
                },
                IndicatorKind::Breakout(config.breakout_lookback),
                IndicatorKind::Extremes(breakout::EXTREME_LOOKBACKS[0]),
                IndicatorKind::SupportResistance(config.support_resistance_lookback),
                IndicatorKind::Rsi(config.rsi_period),
                IndicatorKind::Macd {
                    fast: config.macd_fast,
                    slow: config.macd_slow,
                    signal: config.macd_signal,
                },
                IndicatorKind::Bollinger {
                    period: config.bollinger_period,
                    stddev_mult_x100: config.bollinger_stddev_x100,
                },
                IndicatorKind::Volatility,
                IndicatorKind::Correlation,
            ] {
                mark_missing(unavailable, kind, "no price history");
            }
        }
    }

    match &snapshot.volume_history {
        Some(volumes) => {
            let values = volumes.values();
            let history = &values[..values.len().saturating_sub(1)];
            out.volume_change_rate = absorb(
                indicator::volume_change_rate(snapshot.volume, history),
                &mut out.unavailable,
            )?;
        }
        None => mark_missing(
            &mut out.unavailable,
            IndicatorKind::VolumeChange,
            "no volume history",
        ),
    }

    if !out.unavailable.is_empty() {
        debug!(
            symbol = %snapshot.symbol,
            unavailable = out.unavailable.len(),
            "some indicators unavailable"
        );
    }
    Ok(out)
}

/// Computes every snapshot in parallel; the output keeps input order.
pub fn compute_batch(
    snapshots: &[InstrumentSnapshot],
    market: Option<&PriceSeries>,
    config: &IndicatorConfig,
    metrics: &dyn MetricsPort,
) -> Result<Vec<TechnicalIndicators>, PulseError> {
    let results: Vec<TechnicalIndicators> = snapshots
        .par_iter()
        .map(|s| compute_indicators(s, market, config))
        .collect::<Result<_, _>>()?;

    for record in &results {
        if !record.unavailable.is_empty() {
            metrics.increment("indicator.unavailable", record.unavailable.len() as u64);
            warn!(
                symbol = %record.symbol,
                indicators = ?record.unavailable.iter().map(|u| u.indicator.as_str()).collect::<Vec<_>>(),
                "indicators unavailable"
            );
        }
    }
    Ok(results)
}

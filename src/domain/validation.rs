//! Structural and business-rule checks.
//!
//! Inbound: instrument snapshots (malformed input) and indicator records.
//! Outbound: parsed analysis results, checked against the request that
//! produced them, plus a cross-result consistency pass that only warns.

use crate::domain::aggregator::TechnicalIndicators;
use crate::domain::analysis::{
    Action, AnalysisKind, AnalysisRequest, AnalysisResult, InstrumentRole, Recommendation,
};
use crate::domain::error::{PulseError, ValidationError};
use crate::domain::instrument::{normalize_symbol, InstrumentSnapshot};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::warn;

pub const MAX_RECOMMENDATIONS: usize = 50;
pub const MAX_SYMBOL_LEN: usize = 32;

fn check_range(field: &str, value: f64, min: f64, max: f64) -> Result<(), ValidationError> {
    if !(min..=max).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn finite_non_negative(symbol: &str, field: &str, value: f64) -> Result<(), PulseError> {
    if !value.is_finite() || value < 0.0 {
        return Err(PulseError::malformed(format!(
            "{symbol}: {field} must be finite and non-negative, got {value}"
        )));
    }
    Ok(())
}

/// Symbol shape, finite non-negative price/volume, matching history
/// lengths, and a capture time that is not in the future.
///
/// A symbol is any non-empty run of up to [`MAX_SYMBOL_LEN`] characters
/// without whitespace or control characters.
pub fn validate_snapshot(
    snapshot: &InstrumentSnapshot,
    now: DateTime<Utc>,
) -> Result<(), PulseError> {
    let symbol = snapshot.symbol.trim();
    if symbol.is_empty() {
        return Err(PulseError::malformed("instrument symbol is empty"));
    }
    if symbol.chars().count() > MAX_SYMBOL_LEN
        || symbol.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(PulseError::malformed(format!(
            "instrument symbol '{symbol}' is not a valid ticker"
        )));
    }

    finite_non_negative(symbol, "current price", snapshot.current_price)?;
    finite_non_negative(symbol, "previous close", snapshot.previous_close)?;
    finite_non_negative(symbol, "volume", snapshot.volume)?;

    if snapshot.captured_at > now {
        return Err(PulseError::malformed(format!(
            "{symbol}: capture time {} is in the future",
            snapshot.captured_at
        )));
    }

    if let (Some(prices), Some(volumes)) = (&snapshot.price_history, &snapshot.volume_history) {
        if prices.len() != volumes.len() || prices.dates() != volumes.dates() {
            return Err(PulseError::malformed(format!(
                "{symbol}: price and volume histories are not aligned ({} vs {} points)",
                prices.len(),
                volumes.len()
            )));
        }
    }
    Ok(())
}

/// Every snapshot valid and every symbol unique.
pub fn validate_snapshots(
    snapshots: &[&InstrumentSnapshot],
    now: DateTime<Utc>,
) -> Result<(), PulseError> {
    let mut seen = HashSet::new();
    for snapshot in snapshots {
        validate_snapshot(snapshot, now)?;
        if !seen.insert(normalize_symbol(&snapshot.symbol)) {
            return Err(PulseError::malformed(format!(
                "duplicate instrument symbol {}",
                snapshot.symbol
            )));
        }
    }
    Ok(())
}

pub fn validate_indicators(indicators: &TechnicalIndicators) -> Result<(), ValidationError> {
    if let Some(rsi) = indicators.rsi {
        check_range("rsi", rsi, 0.0, 100.0)?;
    }
    if let Some(corr) = indicators.market_correlation {
        check_range("market_correlation", corr, -1.0, 1.0)?;
    }
    if indicators.golden_cross && indicators.dead_cross {
        return Err(ValidationError::Inconsistent {
            field: "cross".into(),
            reason: "golden and dead cross both set".into(),
        });
    }
    if let (Some(short), Some(long)) = (indicators.short_ma, indicators.long_ma) {
        if indicators.golden_cross && short <= long {
            return Err(ValidationError::Inconsistent {
                field: "golden_cross".into(),
                reason: format!("short average {short} is not above long average {long}"),
            });
        }
        if indicators.dead_cross && short >= long {
            return Err(ValidationError::Inconsistent {
                field: "dead_cross".into(),
                reason: format!("short average {short} is not below long average {long}"),
            });
        }
    }
    if let Some(b) = indicators.bollinger {
        if !(b.lower <= b.middle && b.middle <= b.upper) {
            return Err(ValidationError::Inconsistent {
                field: "bollinger".into(),
                reason: format!(
                    "bands out of order: lower {} middle {} upper {}",
                    b.lower, b.middle, b.upper
                ),
            });
        }
    }
    if let Some(levels) = indicators.levels {
        if levels.support > levels.resistance {
            return Err(ValidationError::Inconsistent {
                field: "support".into(),
                reason: format!(
                    "support {} above resistance {}",
                    levels.support, levels.resistance
                ),
            });
        }
    }
    Ok(())
}

fn validate_recommendation_fields(rec: &Recommendation) -> Result<(), ValidationError> {
    if rec.symbol.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "recommendation symbol".into(),
        });
    }
    check_range(&format!("{} confidence", rec.symbol), rec.confidence, 0.0, 1.0)?;
    if let (Action::Buy, Some(target), Some(stop)) = (rec.action, rec.target_price, rec.stop_loss) {
        if stop >= target {
            return Err(ValidationError::Inconsistent {
                field: format!("{} stop_loss", rec.symbol),
                reason: format!("stop loss {stop} not below target {target} for BUY"),
            });
        }
    }
    Ok(())
}

/// No duplicate symbols, no symbols outside the request and, for daily
/// runs, no SELL on a watchlist instrument.
pub fn validate_recommendation_set(
    recommendations: &[Recommendation],
    request: &AnalysisRequest,
) -> Result<(), ValidationError> {
    if recommendations.len() > MAX_RECOMMENDATIONS {
        return Err(ValidationError::TooMany {
            count: recommendations.len(),
            max: MAX_RECOMMENDATIONS,
        });
    }
    let mut seen = HashSet::new();
    for rec in recommendations {
        if !seen.insert(normalize_symbol(&rec.symbol)) {
            return Err(ValidationError::DuplicateSymbol {
                symbol: rec.symbol.clone(),
            });
        }
        let role = request
            .role_of(&rec.symbol)
            .ok_or_else(|| ValidationError::NotInRequest {
                symbol: rec.symbol.clone(),
            })?;
        if request.kind == AnalysisKind::Daily
            && role == InstrumentRole::Watchlist
            && rec.action == Action::Sell
        {
            return Err(ValidationError::SellNotHeld {
                symbol: rec.symbol.clone(),
            });
        }
    }
    Ok(())
}

/// Full check of a parsed result against its originating request.
pub fn validate_result(
    result: &AnalysisResult,
    request: &AnalysisRequest,
) -> Result<(), ValidationError> {
    if result.summary.trim().is_empty() {
        return Err(ValidationError::Empty {
            field: "summary".into(),
        });
    }
    check_range(
        "diversification_score",
        result.risk_assessment.diversification_score,
        0.0,
        1.0,
    )?;
    for rec in &result.recommendations {
        validate_recommendation_fields(rec)?;
    }
    validate_recommendation_set(&result.recommendations, request)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsistencyWarning {
    pub symbol: String,
    pub buy_in: Vec<AnalysisKind>,
    pub sell_in: Vec<AnalysisKind>,
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |kinds: &[AnalysisKind]| {
            kinds
                .iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(",")
        };
        write!(
            f,
            "{}: BUY in [{}] but SELL in [{}]",
            self.symbol,
            join(&self.buy_in),
            join(&self.sell_in)
        )
    }
}

/// Flags symbols recommended as BUY in one result and SELL in another.
/// Never fails; the warnings are logged and returned.
pub fn check_consistency(results: &[AnalysisResult]) -> Vec<ConsistencyWarning> {
    let mut by_symbol: BTreeMap<&str, (Vec<AnalysisKind>, Vec<AnalysisKind>)> = BTreeMap::new();
    for result in results {
        for rec in &result.recommendations {
            let entry = by_symbol.entry(rec.symbol.as_str()).or_default();
            match rec.action {
                Action::Buy => entry.0.push(result.kind),
                Action::Sell => entry.1.push(result.kind),
                Action::Hold => {}
            }
        }
    }

    let warnings: Vec<ConsistencyWarning> = by_symbol
        .into_iter()
        .filter(|(_, (buy, sell))| !buy.is_empty() && !sell.is_empty())
        .map(|(symbol, (buy_in, sell_in))| ConsistencyWarning {
            symbol: symbol.to_string(),
            buy_in,
            sell_in,
        })
        .collect();

    for w in &warnings {
        warn!(warning = %w, "contradictory recommendations across results");
    }
    warnings
}

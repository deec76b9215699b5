//! Parsing of the analysis service's text answer into an [`AnalysisResult`].
//!
//! JSON extraction tries, in order: the whole text, the first ```json fenced
//! block, the first plain ``` fenced block, and the span from the first `{`
//! to the last `}`.
//!
//! Normalisation:
//! - action and risk strings are case-insensitive; STRONG_BUY/STRONG_SELL
//!   become BUY/SELL and VERY_HIGH becomes HIGH
//! - confidence and diversification in (1, 100] are read as percentages
//! - non-positive target price or stop loss is dropped
//! - symbols are trimmed and upper-cased
//!
//! Range checks are left to the validators.

use crate::domain::analysis::{
    Action, AnalysisKind, AnalysisResult, Recommendation, RiskAssessment, RiskLevel, TimeHorizon,
};
use crate::domain::error::ParseError;
use crate::domain::instrument::normalize_symbol;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct WireResponse {
    summary: Option<String>,
    market_outlook: Option<String>,
    recommendations: Option<Vec<WireRecommendation>>,
    risk_assessment: Option<WireRisk>,
}

#[derive(Debug, Deserialize)]
struct WireRecommendation {
    symbol: Option<String>,
    action: Option<String>,
    confidence: Option<f64>,
    reasoning: Option<String>,
    target_price: Option<f64>,
    stop_loss: Option<f64>,
    time_horizon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireRisk {
    overall_risk: Option<String>,
    diversification_score: Option<f64>,
    narrative: Option<String>,
    recommendations: Option<Vec<String>>,
}

fn parse_object(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(v @ Value::Object(_)) => Some(v),
        _ => None,
    }
}

fn fenced_block<'a>(text: &'a str, opener: &str) -> Option<&'a str> {
    let start = text.find(opener)? + opener.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(&rest[..end])
}

pub fn extract_json(text: &str) -> Result<Value, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    if let Some(v) = parse_object(text) {
        return Ok(v);
    }
    if let Some(v) = fenced_block(text, "```json").and_then(parse_object) {
        return Ok(v);
    }
    if let Some(v) = fenced_block(text, "```").and_then(parse_object) {
        return Ok(v);
    }
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<Value>(&text[start..=end])
                .map_err(|e| ParseError::InvalidJson(e.to_string()))
        }
        _ => Err(ParseError::NoJson),
    }
}

/// Whole numbers in 2..=100 are read as percentages. Anything else is
/// passed through, so a fractional 1.5 stays out of range.
fn normalize_unit(value: f64) -> f64 {
    if value > 1.0 && value <= 100.0 && value.fract() == 0.0 {
        value / 100.0
    } else {
        value
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v > 0.0)
}

fn token(value: &str) -> String {
    value.trim().to_ascii_uppercase().replace([' ', '-'], "_")
}

fn parse_action(value: &str) -> Result<Action, ParseError> {
    match token(value).as_str() {
        "BUY" | "STRONG_BUY" => Ok(Action::Buy),
        "SELL" | "STRONG_SELL" => Ok(Action::Sell),
        "HOLD" => Ok(Action::Hold),
        _ => Err(ParseError::InvalidValue {
            field: "action".into(),
            value: value.to_string(),
        }),
    }
}

fn parse_risk(value: &str) -> Result<RiskLevel, ParseError> {
    match token(value).as_str() {
        "LOW" => Ok(RiskLevel::Low),
        "MEDIUM" | "MODERATE" => Ok(RiskLevel::Medium),
        "HIGH" | "VERY_HIGH" => Ok(RiskLevel::High),
        _ => Err(ParseError::InvalidValue {
            field: "overall_risk".into(),
            value: value.to_string(),
        }),
    }
}

fn parse_horizon(value: &str) -> Result<TimeHorizon, ParseError> {
    match token(value).as_str() {
        "SHORT" | "SHORT_TERM" => Ok(TimeHorizon::Short),
        "MEDIUM" | "MEDIUM_TERM" => Ok(TimeHorizon::Medium),
        "LONG" | "LONG_TERM" => Ok(TimeHorizon::Long),
        _ => Err(ParseError::InvalidValue {
            field: "time_horizon".into(),
            value: value.to_string(),
        }),
    }
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, ParseError> {
    value.ok_or_else(|| ParseError::MissingField(field.to_string()))
}

fn convert_recommendation(
    index: usize,
    wire: WireRecommendation,
) -> Result<Recommendation, ParseError> {
    let field = |name: &str| format!("recommendations[{index}].{name}");
    let symbol = required(wire.symbol, &field("symbol"))?;
    let action = required(wire.action, &field("action"))?;
    let confidence = required(wire.confidence, &field("confidence"))?;

    Ok(Recommendation {
        symbol: normalize_symbol(&symbol),
        action: parse_action(&action)?,
        confidence: normalize_unit(confidence),
        reasoning: wire.reasoning.unwrap_or_default(),
        target_price: positive(wire.target_price),
        stop_loss: positive(wire.stop_loss),
        time_horizon: wire.time_horizon.as_deref().map(parse_horizon).transpose()?,
    })
}

/// Parses the raw service answer for a request of `kind`.
pub fn parse_response(
    text: &str,
    kind: AnalysisKind,
    generated_at: DateTime<Utc>,
) -> Result<AnalysisResult, ParseError> {
    let value = extract_json(text)?;
    let wire: WireResponse =
        serde_json::from_value(value).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let summary = required(wire.summary, "summary")?;
    let risk = required(wire.risk_assessment, "risk_assessment")?;

    let recommendations = wire
        .recommendations
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(i, r)| convert_recommendation(i, r))
        .collect::<Result<Vec<_>, _>>()?;

    let risk_assessment = RiskAssessment {
        overall_risk: parse_risk(&required(risk.overall_risk, "risk_assessment.overall_risk")?)?,
        diversification_score: normalize_unit(required(
            risk.diversification_score,
            "risk_assessment.diversification_score",
        )?),
        narrative: risk.narrative.unwrap_or_default(),
        recommendations: risk.recommendations.unwrap_or_default(),
    };

    Ok(AnalysisResult {
        kind,
        summary: summary.trim().to_string(),
        recommendations,
        risk_assessment,
        market_outlook: wire.market_outlook.unwrap_or_default(),
        generated_at,
    })
}

//! Analysis request and result types.

use crate::domain::aggregator::TechnicalIndicators;
use crate::domain::indicator::TechnicalSignal;
use crate::domain::instrument::InstrumentSnapshot;
use crate::domain::portfolio::PortfolioContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Upper bound on instruments in one request.
pub const MAX_REQUEST_INSTRUMENTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisKind {
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisKind::Daily => write!(f, "daily"),
            AnalysisKind::Weekly => write!(f, "weekly"),
            AnalysisKind::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for AnalysisKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(AnalysisKind::Daily),
            "weekly" => Ok(AnalysisKind::Weekly),
            "monthly" => Ok(AnalysisKind::Monthly),
            other => Err(format!(
                "unknown analysis kind '{other}' (expected daily, weekly or monthly)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "BUY"),
            Action::Sell => write!(f, "SELL"),
            Action::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeHorizon {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstrumentRole {
    Holding,
    Watchlist,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub symbol: String,
    pub action: Action,
    pub confidence: f64,
    pub reasoning: String,
    pub target_price: Option<f64>,
    pub stop_loss: Option<f64>,
    pub time_horizon: Option<TimeHorizon>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub overall_risk: RiskLevel,
    pub diversification_score: f64,
    pub narrative: String,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub kind: AnalysisKind,
    pub summary: String,
    pub recommendations: Vec<Recommendation>,
    pub risk_assessment: RiskAssessment,
    pub market_outlook: String,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisResult {
    pub fn recommendation_for(&self, symbol: &str) -> Option<&Recommendation> {
        self.recommendations
            .iter()
            .find(|r| r.symbol.eq_ignore_ascii_case(symbol.trim()))
    }

    pub fn buy_recommendations(&self) -> impl Iterator<Item = &Recommendation> {
        self.recommendations.iter().filter(|r| r.action == Action::Buy)
    }

    pub fn sell_recommendations(&self) -> impl Iterator<Item = &Recommendation> {
        self.recommendations.iter().filter(|r| r.action == Action::Sell)
    }
}

/// One instrument in a request, with its role and (optional) indicators.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestInstrument {
    pub snapshot: InstrumentSnapshot,
    pub role: InstrumentRole,
    pub indicators: Option<TechnicalIndicators>,
}

impl RequestInstrument {
    pub fn holding(snapshot: InstrumentSnapshot, indicators: Option<TechnicalIndicators>) -> Self {
        Self {
            snapshot,
            role: InstrumentRole::Holding,
            indicators,
        }
    }

    pub fn watchlist(snapshot: InstrumentSnapshot, indicators: Option<TechnicalIndicators>) -> Self {
        Self {
            snapshot,
            role: InstrumentRole::Watchlist,
            indicators,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.snapshot.symbol
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketContext {
    pub reference_symbol: String,
    pub period_return: f64,
    pub trend: TechnicalSignal,
}

impl MarketContext {
    /// Trend is bullish above +2% over the period, bearish below -2%.
    pub fn from_return(reference_symbol: impl Into<String>, period_return: f64) -> Self {
        let trend = if period_return > 2.0 {
            TechnicalSignal::Bullish
        } else if period_return < -2.0 {
            TechnicalSignal::Bearish
        } else {
            TechnicalSignal::Neutral
        };
        Self {
            reference_symbol: reference_symbol.into(),
            period_return,
            trend,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub kind: AnalysisKind,
    pub instruments: Vec<RequestInstrument>,
    pub portfolio: Option<PortfolioContext>,
    pub market: Option<MarketContext>,
}

impl AnalysisRequest {
    pub fn new(kind: AnalysisKind, instruments: Vec<RequestInstrument>) -> Self {
        Self {
            kind,
            instruments,
            portfolio: None,
            market: None,
        }
    }

    pub fn with_portfolio(mut self, portfolio: PortfolioContext) -> Self {
        self.portfolio = Some(portfolio);
        self
    }

    pub fn with_market(mut self, market: MarketContext) -> Self {
        self.market = Some(market);
        self
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.instruments.iter().map(|i| i.symbol())
    }

    pub fn role_of(&self, symbol: &str) -> Option<InstrumentRole> {
        self.instruments
            .iter()
            .find(|i| i.symbol().eq_ignore_ascii_case(symbol.trim()))
            .map(|i| i.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_kind_from_str() {
        assert_eq!("daily".parse::<AnalysisKind>().unwrap(), AnalysisKind::Daily);
        assert_eq!(" Weekly ".parse::<AnalysisKind>().unwrap(), AnalysisKind::Weekly);
        assert_eq!("MONTHLY".parse::<AnalysisKind>().unwrap(), AnalysisKind::Monthly);
        assert!("hourly".parse::<AnalysisKind>().is_err());
    }

    #[test]
    fn enums_serialize_upper_case() {
        assert_eq!(serde_json::to_string(&Action::Buy).unwrap(), "\"BUY\"");
        assert_eq!(serde_json::to_string(&RiskLevel::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(serde_json::to_string(&AnalysisKind::Monthly).unwrap(), "\"MONTHLY\"");
    }

    #[test]
    fn market_context_trend() {
        assert_eq!(MarketContext::from_return("SPY", 3.0).trend, TechnicalSignal::Bullish);
        assert_eq!(MarketContext::from_return("SPY", -3.0).trend, TechnicalSignal::Bearish);
        assert_eq!(MarketContext::from_return("SPY", 1.0).trend, TechnicalSignal::Neutral);
    }

    #[test]
    fn result_accessors() {
        let rec = |symbol: &str, action| Recommendation {
            symbol: symbol.into(),
            action,
            confidence: 0.5,
            reasoning: String::new(),
            target_price: None,
            stop_loss: None,
            time_horizon: None,
        };
        let result = AnalysisResult {
            kind: AnalysisKind::Daily,
            summary: "s".into(),
            recommendations: vec![rec("AAA", Action::Buy), rec("BBB", Action::Sell), rec("CCC", Action::Buy)],
            risk_assessment: RiskAssessment {
                overall_risk: RiskLevel::Low,
                diversification_score: 0.5,
                narrative: String::new(),
                recommendations: vec![],
            },
            market_outlook: String::new(),
            generated_at: Utc::now(),
        };
        assert_eq!(result.buy_recommendations().count(), 2);
        assert_eq!(result.sell_recommendations().count(), 1);
        assert_eq!(result.recommendation_for("BBB").unwrap().action, Action::Sell);
        assert!(result.recommendation_for("ZZZ").is_none());
        assert_eq!(result.recommendation_for("bbb").unwrap().action, Action::Sell);
    }

    #[test]
    fn role_lookup_ignores_case() {
        let at = Utc::now();
        let mut held = InstrumentSnapshot::new("aaa", 1.0, 1.0, 0.0, at);
        assert_eq!(held.symbol, "AAA");
        // fields are public, so a lower-case symbol can still reach a request
        held.symbol = "bbb".into();
        let request = AnalysisRequest::new(
            AnalysisKind::Daily,
            vec![
                RequestInstrument::holding(held, None),
                RequestInstrument::watchlist(InstrumentSnapshot::new("ccc", 1.0, 1.0, 0.0, at), None),
            ],
        );
        assert_eq!(request.role_of("BBB"), Some(InstrumentRole::Holding));
        assert_eq!(request.role_of(" bbb "), Some(InstrumentRole::Holding));
        assert_eq!(request.role_of("Ccc"), Some(InstrumentRole::Watchlist));
        assert_eq!(request.role_of("ZZZ"), None);
    }
}

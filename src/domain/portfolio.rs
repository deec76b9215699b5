//! Portfolio holdings and the aggregate view handed to weekly/monthly analysis.

use crate::domain::error::PulseError;
use crate::domain::instrument::{normalize_symbol, InstrumentSnapshot};
use crate::domain::series::PriceSeries;
use serde::Serialize;
use std::collections::BTreeMap;

/// One configured holding row.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub symbol: String,
    pub name: Option<String>,
    pub quantity: f64,
    pub purchase_price: Option<f64>,
    pub country: Option<String>,
    pub sector: Option<String>,
}

impl Holding {
    pub fn new(symbol: impl AsRef<str>, quantity: f64) -> Self {
        Self {
            symbol: normalize_symbol(symbol.as_ref()),
            name: None,
            quantity,
            purchase_price: None,
            country: None,
            sector: None,
        }
    }

    pub fn with_purchase_price(mut self, price: f64) -> Self {
        self.purchase_price = Some(price);
        self
    }

    pub fn with_attribution(mut self, country: impl Into<String>, sector: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self.sector = Some(sector.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingPosition {
    pub symbol: String,
    pub quantity: f64,
    pub current_price: f64,
    pub current_value: f64,
    /// Share of total portfolio value, 0..1.
    pub weight: f64,
    pub day_change: f64,
    pub unrealized_gain_loss: Option<f64>,
    pub unrealized_percent: Option<f64>,
    pub country: Option<String>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkComparison {
    pub benchmark: String,
    pub benchmark_return: f64,
    pub portfolio_return: f64,
    pub excess_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioContext {
    pub total_value: f64,
    pub total_change: f64,
    pub total_change_percent: f64,
    pub unrealized_gain_loss: f64,
    pub positions: Vec<HoldingPosition>,
    pub benchmark: Option<BenchmarkComparison>,
    /// Value-weighted return volatility of the holdings, in percent.
    pub volatility: Option<f64>,
}

impl PortfolioContext {
    /// Fails when a holding has no snapshot or a negative quantity.
    pub fn build(
        holdings: &[Holding],
        snapshots: &[InstrumentSnapshot],
    ) -> Result<Self, PulseError> {
        let mut positions = Vec::with_capacity(holdings.len());
        for holding in holdings {
            if !holding.quantity.is_finite() || holding.quantity < 0.0 {
                return Err(PulseError::malformed(format!(
                    "holding {} has invalid quantity {}",
                    holding.symbol, holding.quantity
                )));
            }
            let snapshot = snapshots
                .iter()
                .find(|s| s.symbol == holding.symbol)
                .ok_or_else(|| {
                    PulseError::malformed(format!("no snapshot for holding {}", holding.symbol))
                })?;

            let current_value = holding.quantity * snapshot.current_price;
            let (gain, pct) = match holding.purchase_price {
                Some(cost) if cost > 0.0 => {
                    let gain = (snapshot.current_price - cost) * holding.quantity;
                    (Some(gain), Some((snapshot.current_price / cost - 1.0) * 100.0))
                }
                _ => (None, None),
            };

            positions.push(HoldingPosition {
                symbol: holding.symbol.clone(),
                quantity: holding.quantity,
                current_price: snapshot.current_price,
                current_value,
                weight: 0.0,
                day_change: snapshot.change() * holding.quantity,
                unrealized_gain_loss: gain,
                unrealized_percent: pct,
                country: holding.country.clone(),
                sector: holding.sector.clone(),
            });
        }

        let total_value: f64 = positions.iter().map(|p| p.current_value).sum();
        let total_change: f64 = positions.iter().map(|p| p.day_change).sum();
        if total_value > 0.0 {
            for p in &mut positions {
                p.weight = p.current_value / total_value;
            }
        }
        let previous_value = total_value - total_change;
        let total_change_percent = if previous_value > 0.0 {
            total_change / previous_value * 100.0
        } else {
            0.0
        };

        Ok(Self {
            total_value,
            total_change,
            total_change_percent,
            unrealized_gain_loss: positions.iter().filter_map(|p| p.unrealized_gain_loss).sum(),
            positions,
            benchmark: None,
            volatility: None,
        })
    }

    /// Portfolio return is the weight-averaged period return of each
    /// holding's price history.
    pub fn with_benchmark(
        mut self,
        name: impl Into<String>,
        benchmark: &PriceSeries,
        snapshots: &[InstrumentSnapshot],
    ) -> Self {
        let Some(benchmark_return) = benchmark.period_return() else {
            return self;
        };
        let mut weighted = 0.0;
        let mut covered = 0.0;
        for p in &self.positions {
            let ret = snapshots
                .iter()
                .find(|s| s.symbol == p.symbol)
                .and_then(|s| s.price_history.as_ref())
                .and_then(|h| h.period_return());
            if let Some(ret) = ret {
                weighted += ret * p.weight;
                covered += p.weight;
            }
        }
        if covered > 0.0 {
            let portfolio_return = weighted / covered;
            self.benchmark = Some(BenchmarkComparison {
                benchmark: name.into(),
                benchmark_return,
                portfolio_return,
                excess_return: portfolio_return - benchmark_return,
            });
        }
        self
    }

    /// `volatilities` maps symbol to return volatility; holdings without a
    /// value are left out of the weighting.
    pub fn with_volatility(mut self, volatilities: &BTreeMap<String, f64>) -> Self {
        let mut weighted = 0.0;
        let mut covered = 0.0;
        for p in &self.positions {
            if let Some(v) = volatilities.get(&p.symbol) {
                weighted += v * p.weight;
                covered += p.weight;
            }
        }
        self.volatility = (covered > 0.0).then(|| weighted / covered);
        self
    }

    /// Symbols missing a country or sector.
    pub fn missing_attribution(&self) -> Vec<&str> {
        self.positions
            .iter()
            .filter(|p| {
                p.country.as_deref().is_none_or(|c| c.trim().is_empty())
                    || p.sector.as_deref().is_none_or(|s| s.trim().is_empty())
            })
            .map(|p| p.symbol.as_str())
            .collect()
    }

    pub fn sector_weights(&self) -> BTreeMap<String, f64> {
        Self::group_weights(self.positions.iter().map(|p| (p.sector.as_deref(), p.weight)))
    }

    pub fn country_weights(&self) -> BTreeMap<String, f64> {
        Self::group_weights(self.positions.iter().map(|p| (p.country.as_deref(), p.weight)))
    }

    fn group_weights<'a>(
        items: impl Iterator<Item = (Option<&'a str>, f64)>,
    ) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        for (key, weight) in items {
            let key = key.unwrap_or("UNKNOWN").to_string();
            *out.entry(key).or_insert(0.0) += weight;
        }
        out
    }
}

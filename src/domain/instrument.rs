//! Point-in-time view of one instrument.

use crate::domain::series::{PriceSeries, VolumeSeries};
use chrono::{DateTime, Utc};

/// Canonical symbol form: trimmed, ASCII letters upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}

/// Current quote plus optional history for one symbol.
///
/// When present, `price_history` ends with the bar that produced
/// `current_price`; indicators that compare the current price against a
/// reference window exclude that last bar.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSnapshot {
    pub symbol: String,
    pub name: Option<String>,
    pub current_price: f64,
    pub previous_close: f64,
    pub volume: f64,
    pub price_history: Option<PriceSeries>,
    pub volume_history: Option<VolumeSeries>,
    pub captured_at: DateTime<Utc>,
}

impl InstrumentSnapshot {
    /// The symbol is stored in [`normalize_symbol`] form.
    pub fn new(
        symbol: impl AsRef<str>,
        current_price: f64,
        previous_close: f64,
        volume: f64,
        captured_at: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: normalize_symbol(symbol.as_ref()),
            name: None,
            current_price,
            previous_close,
            volume,
            price_history: None,
            volume_history: None,
            captured_at,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_history(mut self, prices: PriceSeries, volumes: Option<VolumeSeries>) -> Self {
        self.price_history = Some(prices);
        self.volume_history = volumes;
        self
    }

    pub fn change(&self) -> f64 {
        self.current_price - self.previous_close
    }

    pub fn change_percent(&self) -> f64 {
        if self.previous_close == 0.0 {
            0.0
        } else {
            self.change() / self.previous_close * 100.0
        }
    }
}

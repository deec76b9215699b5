//! Data source port.

use crate::domain::error::PulseError;
use crate::domain::instrument::InstrumentSnapshot;
use crate::domain::portfolio::Holding;
use crate::domain::series::PriceSeries;

#[derive(Debug, Clone, PartialEq)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub name: Option<String>,
}

pub trait DataPort {
    fn fetch_holdings(&self) -> Result<Vec<Holding>, PulseError>;

    fn fetch_watchlist(&self) -> Result<Vec<WatchlistEntry>, PulseError>;

    /// Latest quote plus price/volume history for one symbol.
    fn fetch_snapshot(&self, symbol: &str) -> Result<InstrumentSnapshot, PulseError>;

    /// Reference series for correlation and benchmark comparison, if available.
    fn fetch_market_series(&self, symbol: &str) -> Result<Option<PriceSeries>, PulseError>;
}

//! CSV directory data adapter.
//!
//! Layout under the base path:
//! - `holdings.csv`: symbol,name,quantity,purchase_price,country,sector
//! - `watchlist.csv`: symbol,name (optional file)
//! - `prices/<SYMBOL>.csv`: date,close,volume

use crate::domain::error::PulseError;
use crate::domain::instrument::{normalize_symbol, InstrumentSnapshot};
use crate::domain::portfolio::Holding;
use crate::domain::series::{PriceSeries, VolumeSeries};
use crate::ports::data_port::{DataPort, WatchlistEntry};
use chrono::{NaiveDate, NaiveTime};
use csv::StringRecord;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct CsvAdapter {
    base_path: PathBuf,
}

struct PriceRow {
    date: NaiveDate,
    close: f64,
    volume: f64,
}

fn data_error(reason: impl Into<String>) -> PulseError {
    PulseError::Data {
        reason: reason.into(),
    }
}

fn read_records(path: &Path) -> Result<Vec<StringRecord>, PulseError> {
    let content = fs::read_to_string(path)
        .map_err(|e| data_error(format!("failed to read {}: {}", path.display(), e)))?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    rdr.records()
        .map(|r| r.map_err(|e| data_error(format!("{}: CSV parse error: {}", path.display(), e))))
        .collect()
}

fn required_field<'r>(
    record: &'r StringRecord,
    index: usize,
    column: &str,
) -> Result<&'r str, PulseError> {
    match record.get(index) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(data_error(format!("missing {} column", column))),
    }
}

fn optional_field(record: &StringRecord, index: usize) -> Option<String> {
    record
        .get(index)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn parse_number(value: &str, column: &str) -> Result<f64, PulseError> {
    value
        .parse()
        .map_err(|e| data_error(format!("invalid {} value '{}': {}", column, value, e)))
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn price_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join("prices").join(format!("{}.csv", symbol))
    }

    fn read_prices(&self, symbol: &str) -> Result<Vec<PriceRow>, PulseError> {
        let path = self.price_path(symbol);
        let mut rows = Vec::new();
        for record in read_records(&path)? {
            let date_str = required_field(&record, 0, "date")?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|e| data_error(format!("invalid date format: {}", e)))?;
            let close = parse_number(required_field(&record, 1, "close")?, "close")?;
            let volume = match optional_field(&record, 2) {
                Some(v) => parse_number(&v, "volume")?,
                None => 0.0,
            };
            rows.push(PriceRow {
                date,
                close,
                volume,
            });
        }
        rows.sort_by_key(|r| r.date);
        Ok(rows)
    }
}

impl DataPort for CsvAdapter {
    fn fetch_holdings(&self) -> Result<Vec<Holding>, PulseError> {
        let path = self.base_path.join("holdings.csv");
        let mut holdings = Vec::new();
        for record in read_records(&path)? {
            let symbol = normalize_symbol(required_field(&record, 0, "symbol")?);
            let quantity = parse_number(required_field(&record, 2, "quantity")?, "quantity")?;
            let purchase_price = match optional_field(&record, 3) {
                Some(v) => Some(parse_number(&v, "purchase_price")?),
                None => None,
            };
            holdings.push(Holding {
                symbol,
                name: optional_field(&record, 1),
                quantity,
                purchase_price,
                country: optional_field(&record, 4),
                sector: optional_field(&record, 5),
            });
        }
        debug!(count = holdings.len(), "loaded holdings");
        Ok(holdings)
    }

    fn fetch_watchlist(&self) -> Result<Vec<WatchlistEntry>, PulseError> {
        let path = self.base_path.join("watchlist.csv");
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_records(&path)?
            .iter()
            .map(|record| {
                Ok(WatchlistEntry {
                    symbol: normalize_symbol(required_field(record, 0, "symbol")?),
                    name: optional_field(record, 1),
                })
            })
            .collect()
    }

    fn fetch_snapshot(&self, symbol: &str) -> Result<InstrumentSnapshot, PulseError> {
        let rows = self.read_prices(symbol)?;
        let last = rows
            .last()
            .ok_or_else(|| data_error(format!("no price rows for {}", symbol)))?;
        let previous_close = if rows.len() > 1 {
            rows[rows.len() - 2].close
        } else {
            last.close
        };
        let captured_at = last.date.and_time(NaiveTime::MIN).and_utc();

        let prices = PriceSeries::new(rows.iter().map(|r| (r.date, r.close)).collect())?;
        let volumes = VolumeSeries::new(rows.iter().map(|r| (r.date, r.volume)).collect())?;

        Ok(
            InstrumentSnapshot::new(symbol, last.close, previous_close, last.volume, captured_at)
                .with_history(prices, Some(volumes)),
        )
    }

    fn fetch_market_series(&self, symbol: &str) -> Result<Option<PriceSeries>, PulseError> {
        if !self.price_path(symbol).exists() {
            return Ok(None);
        }
        let rows = self.read_prices(symbol)?;
        PriceSeries::new(rows.into_iter().map(|r| (r.date, r.close)).collect()).map(Some)
    }
}

#![allow(dead_code)]

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, TimeZone, Utc};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::process::ExitCode;
use std::time::{Duration, Instant};
use stockpulse::domain::error::{PulseError, ServiceError, ServiceErrorKind};
use stockpulse::domain::instrument::InstrumentSnapshot;
use stockpulse::domain::portfolio::Holding;
use stockpulse::domain::series::{PriceSeries, VolumeSeries};
use stockpulse::ports::analysis_port::AnalysisPort;
use stockpulse::ports::clock_port::Clock;
use stockpulse::ports::data_port::{DataPort, WatchlistEntry};
use stockpulse::ports::metrics_port::MetricsPort;

pub fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

/// Snapshot whose history ends with `closes.last()`, volumes constant.
pub fn make_snapshot(symbol: &str, closes: &[f64]) -> InstrumentSnapshot {
    let prices = PriceSeries::from_values(start_date(), closes).unwrap();
    let volumes = VolumeSeries::from_values(start_date(), &vec![1_000.0; closes.len()]).unwrap();
    let last = *closes.last().unwrap();
    let prev = if closes.len() > 1 {
        closes[closes.len() - 2]
    } else {
        last
    };
    let captured = start_date() + ChronoDuration::days(closes.len() as i64 - 1);
    InstrumentSnapshot::new(
        symbol,
        last,
        prev,
        1_000.0,
        captured.and_hms_opt(0, 0, 0).unwrap().and_utc(),
    )
    .with_history(prices, Some(volumes))
}

/// Gently rising closes, long enough for every default indicator.
pub fn trending_closes(len: usize, start: f64, step: f64) -> Vec<f64> {
    (0..len)
        .map(|i| start + step * i as f64 + if i % 3 == 0 { 0.5 } else { 0.0 })
        .collect()
}

pub struct MockDataPort {
    pub holdings: Vec<Holding>,
    pub watchlist: Vec<WatchlistEntry>,
    pub snapshots: HashMap<String, InstrumentSnapshot>,
    pub market: HashMap<String, PriceSeries>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            holdings: Vec::new(),
            watchlist: Vec::new(),
            snapshots: HashMap::new(),
            market: HashMap::new(),
        }
    }

    pub fn with_holding(mut self, holding: Holding, closes: &[f64]) -> Self {
        self.snapshots
            .insert(holding.symbol.clone(), make_snapshot(&holding.symbol, closes));
        self.holdings.push(holding);
        self
    }

    pub fn with_watch(mut self, symbol: &str, closes: &[f64]) -> Self {
        self.snapshots
            .insert(symbol.to_string(), make_snapshot(symbol, closes));
        self.watchlist.push(WatchlistEntry {
            symbol: symbol.to_string(),
            name: None,
        });
        self
    }

    pub fn with_market(mut self, symbol: &str, closes: &[f64]) -> Self {
        self.market.insert(
            symbol.to_string(),
            PriceSeries::from_values(start_date(), closes).unwrap(),
        );
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_holdings(&self) -> Result<Vec<Holding>, PulseError> {
        Ok(self.holdings.clone())
    }

    fn fetch_watchlist(&self) -> Result<Vec<WatchlistEntry>, PulseError> {
        Ok(self.watchlist.clone())
    }

    fn fetch_snapshot(&self, symbol: &str) -> Result<InstrumentSnapshot, PulseError> {
        self.snapshots
            .get(symbol)
            .cloned()
            .ok_or_else(|| PulseError::Data {
                reason: format!("no data for {symbol}"),
            })
    }

    fn fetch_market_series(&self, symbol: &str) -> Result<Option<PriceSeries>, PulseError> {
        Ok(self.market.get(symbol).cloned())
    }
}

/// Replays scripted answers in order and records every prompt it receives.
pub struct ScriptedService {
    responses: RefCell<VecDeque<Result<String, ServiceError>>>,
    pub prompts: RefCell<Vec<String>>,
}

impl ScriptedService {
    pub fn new(responses: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            responses: RefCell::new(responses.into()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn answering(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }
}

impl AnalysisPort for ScriptedService {
    fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.responses.borrow_mut().pop_front().unwrap_or_else(|| {
            Err(ServiceError::new(
                ServiceErrorKind::Rejected,
                "no scripted response left",
            ))
        })
    }
}

pub fn transient() -> Result<String, ServiceError> {
    Err(ServiceError::new(ServiceErrorKind::Unavailable, "503"))
}

#[derive(Default)]
pub struct RecordingMetrics {
    pub counters: RefCell<Vec<(String, u64)>>,
    pub timings: RefCell<Vec<(String, Duration)>>,
}

impl RecordingMetrics {
    pub fn total(&self, name: &str) -> u64 {
        self.counters
            .borrow()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v)
            .sum()
    }

    pub fn timed(&self, name: &str) -> bool {
        self.timings.borrow().iter().any(|(n, _)| n == name)
    }
}

impl MetricsPort for RecordingMetrics {
    fn increment(&self, name: &str, value: u64) {
        self.counters.borrow_mut().push((name.to_string(), value));
    }

    fn timing(&self, name: &str, elapsed: Duration) {
        self.timings.borrow_mut().push((name.to_string(), elapsed));
    }
}

/// Clock whose sleeps advance time instantly.
pub struct FakeClock {
    start: Instant,
    elapsed: Cell<Duration>,
    pub wall: DateTime<Utc>,
    pub sleeps: RefCell<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            wall: Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap(),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn total_slept(&self) -> Duration {
        self.sleeps.borrow().iter().sum()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed.get()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.wall
    }

    fn sleep(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
        self.sleeps.borrow_mut().push(duration);
    }
}

/// Well-formed answer recommending the given (symbol, action) pairs.
pub fn response_json(recommendations: &[(&str, &str)]) -> String {
    let recs: Vec<String> = recommendations
        .iter()
        .map(|(symbol, action)| {
            format!(
                r#"{{"symbol": "{symbol}", "action": "{action}", "confidence": 0.7,
                    "reasoning": "trend", "time_horizon": "MEDIUM"}}"#
            )
        })
        .collect();
    format!(
        r#"{{"summary": "Portfolio steady", "market_outlook": "Neutral",
            "recommendations": [{}],
            "risk_assessment": {{"overall_risk": "MEDIUM", "diversification_score": 0.6,
                "narrative": "balanced", "recommendations": []}}}}"#,
        recs.join(",")
    )
}

pub fn exit_code_is(code: ExitCode, expected: u8) -> bool {
    format!("{code:?}") == format!("{:?}", ExitCode::from(expected))
}

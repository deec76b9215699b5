//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonFileAdapter;
use crate::adapters::system_clock::SystemClock;
use crate::adapters::tracing_metrics::TracingMetrics;
use crate::domain::aggregator::{compute_batch, IndicatorConfig, TechnicalIndicators};
use crate::domain::analysis::{
    AnalysisKind, AnalysisRequest, AnalysisResult, MarketContext, RequestInstrument,
};
use crate::domain::config_validation::validate_config;
use crate::domain::error::PulseError;
use crate::domain::instrument::{normalize_symbol, InstrumentSnapshot};
use crate::domain::orchestrator::{
    prepare_prompt, AnalysisOrchestrator, BatchOutcome, OrchestratorConfig, DEFAULT_DEADLINE,
};
use crate::domain::portfolio::{Holding, PortfolioContext};
use crate::domain::prompt::PromptConfig;
use crate::domain::retry::RetryPolicy;
use crate::domain::series::PriceSeries;
use crate::logging;
use crate::ports::analysis_port::AnalysisPort;
use crate::ports::clock_port::Clock;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::metrics_port::MetricsPort;
use crate::ports::notification_port::NotificationPort;

#[derive(Parser, Debug)]
#[command(name = "stockpulse", about = "Technical indicators and portfolio analysis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one or more analyses (comma-separated kinds)
    Analyze {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long, value_delimiter = ',', required = true)]
        kind: Vec<AnalysisKind>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Compute and print indicator records
    Indicators {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Command {
    fn config_path(&self) -> &Path {
        match self {
            Command::Analyze { config, .. }
            | Command::Indicators { config, .. }
            | Command::Validate { config } => config,
        }
    }
}

/// Everything a run needs from the INI file.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub data_directory: PathBuf,
    pub benchmark_symbol: Option<String>,
    pub indicators: IndicatorConfig,
    pub orchestrator: OrchestratorConfig,
    pub output: Option<PathBuf>,
}

impl RunSettings {
    /// Expects a config that already passed [`validate_config`].
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PulseError> {
        let data_directory = config
            .get_string("data", "directory")
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| PulseError::ConfigMissing {
                section: "data".into(),
                key: "directory".into(),
            })?;
        Ok(Self {
            data_directory: PathBuf::from(data_directory),
            benchmark_symbol: config
                .get_string("data", "benchmark_symbol")
                .filter(|s| !s.trim().is_empty())
                .map(|s| normalize_symbol(&s)),
            indicators: build_indicator_config(config),
            orchestrator: build_orchestrator_config(config),
            output: config.get_string("output", "path").map(PathBuf::from),
        })
    }
}

fn window(config: &dyn ConfigPort, key: &str, default: usize) -> usize {
    config.get_int("indicators", key, default as i64).max(0) as usize
}

fn stddev_x100(multiplier: f64) -> u32 {
    if multiplier.is_finite() {
        (multiplier * 100.0).round().clamp(0.0, f64::from(u32::MAX)) as u32
    } else {
        0
    }
}

pub fn build_indicator_config(config: &dyn ConfigPort) -> IndicatorConfig {
    let d = IndicatorConfig::default();
    IndicatorConfig {
        short_window: window(config, "short_window", d.short_window),
        long_window: window(config, "long_window", d.long_window),
        breakout_lookback: window(config, "breakout_lookback", d.breakout_lookback),
        support_resistance_lookback: window(
            config,
            "support_resistance_lookback",
            d.support_resistance_lookback,
        ),
        rsi_period: window(config, "rsi_period", d.rsi_period),
        macd_fast: window(config, "macd_fast", d.macd_fast),
        macd_slow: window(config, "macd_slow", d.macd_slow),
        macd_signal: window(config, "macd_signal", d.macd_signal),
        bollinger_period: window(config, "bollinger_period", d.bollinger_period),
        bollinger_stddev_x100: stddev_x100(config.get_double(
            "indicators",
            "bollinger_multiplier",
            f64::from(d.bollinger_stddev_x100) / 100.0,
        )),
    }
}

pub fn build_retry_policy(config: &dyn ConfigPort) -> RetryPolicy {
    let d = RetryPolicy::default();
    RetryPolicy {
        max_attempts: config
            .get_int("retry", "max_attempts", i64::from(d.max_attempts))
            .clamp(1, i64::from(u32::MAX)) as u32,
        base_delay: config.get_secs("retry", "base_delay_secs", d.base_delay),
        max_delay: config.get_secs("retry", "max_delay_secs", d.max_delay),
        jitter: config.get_bool("retry", "jitter", d.jitter),
    }
}

pub fn build_orchestrator_config(config: &dyn ConfigPort) -> OrchestratorConfig {
    let d = PromptConfig::default();
    let limit = |key: &str, default: usize| {
        config.get_int("analysis", key, default as i64).max(1) as usize
    };
    OrchestratorConfig {
        prompt: PromptConfig {
            max_detailed_instruments: limit("max_detailed_instruments", d.max_detailed_instruments),
            max_summarized_instruments: limit(
                "max_summarized_instruments",
                d.max_summarized_instruments,
            ),
            max_prompt_chars: limit("max_prompt_chars", d.max_prompt_chars),
        },
        retry: build_retry_policy(config),
        deadline: Some(Duration::from_secs(
            config
                .get_int("analysis", "deadline_secs", DEFAULT_DEADLINE.as_secs() as i64)
                .max(1) as u64,
        )),
    }
}

/// Holdings, watchlist snapshots and the optional market series.
pub struct PortfolioInputs {
    pub holdings: Vec<Holding>,
    pub holding_snapshots: Vec<InstrumentSnapshot>,
    pub watchlist_snapshots: Vec<InstrumentSnapshot>,
    pub market: Option<PriceSeries>,
}

impl PortfolioInputs {
    pub fn all_snapshots(&self) -> Vec<InstrumentSnapshot> {
        self.holding_snapshots
            .iter()
            .chain(&self.watchlist_snapshots)
            .cloned()
            .collect()
    }
}

/// Watchlist symbols that are also held are kept only as holdings.
pub fn load_inputs(
    data_port: &dyn DataPort,
    settings: &RunSettings,
) -> Result<PortfolioInputs, PulseError> {
    let holdings = data_port.fetch_holdings()?;
    let held: HashSet<&str> = holdings.iter().map(|h| h.symbol.as_str()).collect();

    let holding_snapshots = holdings
        .iter()
        .map(|h| {
            let snap = data_port.fetch_snapshot(&h.symbol)?;
            Ok(match &h.name {
                Some(name) => snap.with_name(name.clone()),
                None => snap,
            })
        })
        .collect::<Result<Vec<_>, PulseError>>()?;

    let mut watchlist_snapshots = Vec::new();
    for entry in data_port.fetch_watchlist()? {
        if held.contains(entry.symbol.as_str()) {
            continue;
        }
        let snap = data_port.fetch_snapshot(&entry.symbol)?;
        watchlist_snapshots.push(match entry.name {
            Some(name) => snap.with_name(name),
            None => snap,
        });
    }

    let market = match &settings.benchmark_symbol {
        Some(symbol) => {
            let series = data_port.fetch_market_series(symbol)?;
            if series.is_none() {
                warn!(symbol = %symbol, "benchmark series not found");
            }
            series
        }
        None => None,
    };

    info!(
        holdings = holding_snapshots.len(),
        watchlist = watchlist_snapshots.len(),
        benchmark = market.is_some(),
        "inputs loaded"
    );
    Ok(PortfolioInputs {
        holdings,
        holding_snapshots,
        watchlist_snapshots,
        market,
    })
}

/// Computes indicators for every instrument, holdings first.
pub fn compute_all_indicators(
    inputs: &PortfolioInputs,
    settings: &RunSettings,
    metrics: &dyn MetricsPort,
) -> Result<Vec<TechnicalIndicators>, PulseError> {
    compute_batch(
        &inputs.all_snapshots(),
        inputs.market.as_ref(),
        &settings.indicators,
        metrics,
    )
}

/// Assembles one request per kind from the same inputs and indicators.
pub fn build_requests(
    kinds: &[AnalysisKind],
    inputs: &PortfolioInputs,
    indicators: &[TechnicalIndicators],
    settings: &RunSettings,
) -> Result<Vec<AnalysisRequest>, PulseError> {
    let mut instruments = Vec::with_capacity(indicators.len());
    let holdings = inputs.holding_snapshots.iter().map(|s| (s, true));
    let watchlist = inputs.watchlist_snapshots.iter().map(|s| (s, false));
    for ((snapshot, held), ind) in holdings.chain(watchlist).zip(indicators) {
        let ind = Some(ind.clone());
        instruments.push(if held {
            RequestInstrument::holding(snapshot.clone(), ind)
        } else {
            RequestInstrument::watchlist(snapshot.clone(), ind)
        });
    }

    let portfolio = if inputs.holdings.is_empty() {
        None
    } else {
        let volatility: BTreeMap<String, f64> = indicators
            .iter()
            .filter_map(|i| i.volatility.map(|v| (i.symbol.clone(), v)))
            .collect();
        let mut context = PortfolioContext::build(&inputs.holdings, &inputs.holding_snapshots)?
            .with_volatility(&volatility);
        if let (Some(symbol), Some(series)) = (&settings.benchmark_symbol, &inputs.market) {
            context = context.with_benchmark(symbol.clone(), series, &inputs.holding_snapshots);
        }
        Some(context)
    };

    let market = match (&settings.benchmark_symbol, &inputs.market) {
        (Some(symbol), Some(series)) => series
            .period_return()
            .map(|r| MarketContext::from_return(symbol.clone(), r)),
        _ => None,
    };

    Ok(kinds
        .iter()
        .map(|kind| {
            let mut request = AnalysisRequest::new(*kind, instruments.clone());
            if let Some(p) = &portfolio {
                request = request.with_portfolio(p.clone());
            }
            if let Some(m) = &market {
                request = request.with_market(m.clone());
            }
            request
        })
        .collect())
}

/// Load, compute, and run every requested kind through the orchestrator.
pub fn run_analysis_pipeline(
    data_port: &dyn DataPort,
    service: &dyn AnalysisPort,
    clock: &dyn Clock,
    metrics: &dyn MetricsPort,
    settings: &RunSettings,
    kinds: &[AnalysisKind],
) -> Result<BatchOutcome, PulseError> {
    // Stage 1: Load holdings, watchlist and benchmark
    let inputs = load_inputs(data_port, settings)?;

    // Stage 2: Indicators
    let indicators = compute_all_indicators(&inputs, settings, metrics)?;

    // Stage 3: Requests
    let requests = build_requests(kinds, &inputs, &indicators, settings)?;

    // Stage 4: Analysis
    let orchestrator =
        AnalysisOrchestrator::new(service, metrics, clock, settings.orchestrator.clone());
    let outcome = orchestrator.run_batch(&requests)?;
    for warning in &outcome.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(outcome)
}

pub fn run(cli: Cli) -> ExitCode {
    let config = match load_config(cli.command.config_path()) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let level = config
        .get_string("logging", "level")
        .unwrap_or_else(|| logging::DEFAULT_LEVEL.to_string());
    // A subscriber may already be installed when run is called repeatedly.
    let _ = logging::init_logging(&level);

    match cli.command {
        Command::Analyze {
            kind,
            output,
            dry_run,
            ..
        } => run_analyze(&config, &kind, output.as_deref(), dry_run),
        Command::Indicators { symbol, .. } => run_indicators(&config, symbol.as_deref()),
        Command::Validate { config: path } => run_validate(&config, &path),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn fail(err: PulseError) -> ExitCode {
    error!(category = %err.category(), "{err}");
    eprintln!("error: {err}");
    (&err).into()
}

fn validated_settings(config: &FileConfigAdapter) -> Result<RunSettings, PulseError> {
    validate_config(config)?;
    RunSettings::from_config(config)
}

#[cfg(feature = "gemini")]
fn build_service(config: &dyn ConfigPort) -> Result<Box<dyn AnalysisPort>, PulseError> {
    use crate::adapters::gemini_adapter::{GeminiAdapter, GeminiConfig};
    let gemini = GeminiConfig::from_config(config)?;
    info!(model = %gemini.model, "using Gemini analysis service");
    Ok(Box::new(GeminiAdapter::new(gemini)?))
}

#[cfg(not(feature = "gemini"))]
fn build_service(_config: &dyn ConfigPort) -> Result<Box<dyn AnalysisPort>, PulseError> {
    Err(PulseError::Configuration {
        reason: "built without an analysis service (enable the gemini feature)".into(),
    })
}

fn run_analyze(
    config: &FileConfigAdapter,
    kinds: &[AnalysisKind],
    output_override: Option<&Path>,
    dry_run: bool,
) -> ExitCode {
    // Stage 1: Validate config
    let settings = match validated_settings(config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let data_port = CsvAdapter::new(settings.data_directory.clone());
    let clock = SystemClock;
    let metrics = TracingMetrics;

    if dry_run {
        return match run_dry_run(&data_port, &clock, &metrics, &settings, kinds) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => fail(e),
        };
    }

    // Stage 2: Analysis service
    let service = match build_service(config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    // Stage 3: Pipeline
    let outcome = match run_analysis_pipeline(
        &data_port,
        service.as_ref(),
        &clock,
        &metrics,
        &settings,
        kinds,
    ) {
        Ok(o) => o,
        Err(e) => return fail(e),
    };

    // Stage 4: Publish
    let output = output_override
        .map(Path::to_path_buf)
        .or_else(|| settings.output.clone());
    match publish(&outcome.results, output) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(e),
    }
}

fn publish(results: &[AnalysisResult], output: Option<PathBuf>) -> Result<(), PulseError> {
    match output {
        Some(path) => {
            let notifier = JsonFileAdapter::new(path.clone());
            match results {
                [single] => notifier.publish(single)?,
                _ => notifier.publish_all(results)?,
            }
            eprintln!("Analysis written to: {}", path.display());
        }
        None => {
            let json = match results {
                [single] => serde_json::to_string_pretty(single),
                _ => serde_json::to_string_pretty(results),
            }
            .map_err(std::io::Error::other)?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Prints each bounded prompt without contacting the analysis service.
pub fn run_dry_run(
    data_port: &dyn DataPort,
    clock: &dyn Clock,
    metrics: &dyn MetricsPort,
    settings: &RunSettings,
    kinds: &[AnalysisKind],
) -> Result<(), PulseError> {
    let inputs = load_inputs(data_port, settings)?;
    let indicators = compute_all_indicators(&inputs, settings, metrics)?;
    for request in build_requests(kinds, &inputs, &indicators, settings)? {
        let prompt = prepare_prompt(&request, &settings.orchestrator.prompt, clock.utc_now())?;
        eprintln!(
            "== {} prompt: {} chars, {} detailed, {} summarized, {} omitted ==",
            request.kind,
            prompt.text.chars().count(),
            prompt.detailed,
            prompt.summarized,
            prompt.omitted
        );
        println!("{}", prompt.text);
    }
    eprintln!("\nDry run complete: no analysis service called");
    Ok(())
}

fn run_indicators(config: &FileConfigAdapter, symbol: Option<&str>) -> ExitCode {
    let settings = match validated_settings(config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let data_port = CsvAdapter::new(settings.data_directory.clone());

    let records = match load_inputs(&data_port, &settings)
        .and_then(|inputs| compute_all_indicators(&inputs, &settings, &TracingMetrics))
    {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let wanted = symbol.map(normalize_symbol);
    let selected: Vec<&TechnicalIndicators> = records
        .iter()
        .filter(|r| wanted.as_deref().is_none_or(|s| r.symbol == s))
        .collect();
    if selected.is_empty() {
        if let Some(s) = wanted {
            eprintln!("error: no holding or watchlist instrument named {s}");
            return ExitCode::from(3);
        }
    }

    match serde_json::to_string_pretty(&selected) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(std::io::Error::other(e).into()),
    }
}

fn run_validate(config: &FileConfigAdapter, path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", path.display());
    if let Err(e) = validate_config(config) {
        return fail(e);
    }
    eprintln!("Config validated successfully");
    ExitCode::SUCCESS
}

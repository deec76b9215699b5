mod common;

use common::*;
use std::path::PathBuf;
use std::process::ExitCode;
use stockpulse::cli::{self, RunSettings};
use stockpulse::domain::aggregator::{compute_indicators, IndicatorConfig};
use stockpulse::domain::analysis::{
    Action, AnalysisKind, AnalysisRequest, RequestInstrument, MAX_REQUEST_INSTRUMENTS,
};
use stockpulse::domain::error::{
    ErrorCategory, PulseError, ServiceError, ServiceErrorKind, ValidationError,
};
use stockpulse::domain::instrument::InstrumentSnapshot;
use stockpulse::domain::orchestrator::{AnalysisOrchestrator, OrchestratorConfig};
use stockpulse::domain::portfolio::{Holding, PortfolioContext};
use stockpulse::ports::data_port::WatchlistEntry;

fn instrument(symbol: &str, held: bool) -> RequestInstrument {
    let snapshot = make_snapshot(symbol, &trending_closes(120, 100.0, 0.2));
    let indicators = compute_indicators(&snapshot, None, &IndicatorConfig::default()).unwrap();
    if held {
        RequestInstrument::holding(snapshot, Some(indicators))
    } else {
        RequestInstrument::watchlist(snapshot, Some(indicators))
    }
}

fn snapshots_of(request: &[RequestInstrument]) -> Vec<InstrumentSnapshot> {
    request.iter().map(|i| i.snapshot.clone()).collect()
}

/// AAA and BBB held (with attribution), CCC on the watchlist.
fn sample_request(kind: AnalysisKind) -> AnalysisRequest {
    let instruments = vec![
        instrument("AAA", true),
        instrument("BBB", true),
        instrument("CCC", false),
    ];
    let holdings = vec![
        Holding::new("AAA", 10.0).with_attribution("US", "Tech"),
        Holding::new("BBB", 5.0)
            .with_purchase_price(90.0)
            .with_attribution("JP", "Energy"),
    ];
    let portfolio = PortfolioContext::build(&holdings, &snapshots_of(&instruments[..2])).unwrap();
    AnalysisRequest::new(kind, instruments).with_portfolio(portfolio)
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig::default()
}

fn run_one(
    service: &ScriptedService,
    metrics: &RecordingMetrics,
    clock: &FakeClock,
    request: &AnalysisRequest,
) -> Result<stockpulse::domain::analysis::AnalysisResult, PulseError> {
    AnalysisOrchestrator::new(service, metrics, clock, fast_config()).run(request)
}

mod kinds {
    use super::*;

    #[test]
    fn daily_run_returns_parsed_result() {
        let service = ScriptedService::answering(&response_json(&[("AAA", "HOLD"), ("CCC", "BUY")]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let result = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap();

        assert_eq!(result.kind, AnalysisKind::Daily);
        assert_eq!(result.recommendations.len(), 2);
        assert_eq!(result.recommendation_for("CCC").unwrap().action, Action::Buy);
        assert_eq!(result.generated_at, clock.wall);
        assert_eq!(service.calls(), 1);
        assert!(metrics.timed("analysis.duration"));
        assert_eq!(metrics.total("retry.attempt"), 0);

        let prompt = &service.prompts.borrow()[0];
        assert!(prompt.contains("daily"));
        assert!(prompt.contains("Only recommend these symbols:"));
        assert!(prompt.contains("Watchlist instruments are not held"));
    }

    #[test]
    fn weekly_prompt_includes_portfolio() {
        let service = ScriptedService::answering(&response_json(&[("BBB", "SELL")]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let result = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Weekly)).unwrap();

        assert_eq!(result.kind, AnalysisKind::Weekly);
        assert_eq!(result.sell_recommendations().count(), 1);
        let prompt = &service.prompts.borrow()[0];
        assert!(prompt.contains("weekly"));
        assert!(prompt.contains("## Portfolio"));
        assert!(!prompt.contains("By sector:"));
    }

    #[test]
    fn weekly_without_portfolio_is_malformed() {
        let service = ScriptedService::answering(&response_json(&[]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();
        let request = AnalysisRequest::new(AnalysisKind::Weekly, vec![instrument("AAA", true)]);

        let err = run_one(&service, &metrics, &clock, &request).unwrap_err();

        assert_eq!(err.category(), ErrorCategory::MalformedInput);
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn monthly_run_with_attribution_succeeds() {
        let service = ScriptedService::answering(&response_json(&[("AAA", "HOLD"), ("BBB", "HOLD")]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let result = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Monthly)).unwrap();

        assert_eq!(result.kind, AnalysisKind::Monthly);
        let prompt = &service.prompts.borrow()[0];
        assert!(prompt.contains("monthly"));
        assert!(prompt.contains("By sector:"));
        assert!(prompt.contains("Tech"));
        assert!(prompt.contains("Energy"));
    }

    #[test]
    fn monthly_without_attribution_fails_before_calling_service() {
        let service = ScriptedService::answering(&response_json(&[]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let instruments = vec![instrument("AAA", true), instrument("BBB", true)];
        let holdings = vec![
            Holding::new("AAA", 10.0).with_attribution("US", "Tech"),
            Holding::new("BBB", 5.0),
        ];
        let portfolio = PortfolioContext::build(&holdings, &snapshots_of(&instruments)).unwrap();
        let request = AnalysisRequest::new(AnalysisKind::Monthly, instruments).with_portfolio(portfolio);

        let err = run_one(&service, &metrics, &clock, &request).unwrap_err();

        assert!(matches!(&err, PulseError::Configuration { reason } if reason.contains("BBB")));
        assert_eq!(service.calls(), 0);
        // ExitCode doesn't implement PartialEq, so check via report format
        assert!(exit_code_is(ExitCode::from(&err), 2));
    }
}

mod retries {
    use super::*;

    #[test]
    fn transient_failures_are_retried_then_succeed() {
        let service = ScriptedService::new(vec![
            transient(),
            transient(),
            Ok(response_json(&[("AAA", "HOLD")])),
        ]);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let result = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily));

        assert!(result.is_ok());
        assert_eq!(service.calls(), 3);
        assert_eq!(metrics.total("retry.attempt"), 2);
        assert_eq!(metrics.total("retry.exhausted"), 0);
        assert_eq!(clock.sleeps.borrow().len(), 2);
    }

    #[test]
    fn exhausted_retries_report_last_error() {
        let service = ScriptedService::new(vec![transient(), transient(), transient()]);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap_err();

        assert!(matches!(
            &err,
            PulseError::RetryExhausted { attempts: 3, last } if last.kind == ServiceErrorKind::Unavailable
        ));
        assert_eq!(err.category(), ErrorCategory::RetryExhausted);
        assert_eq!(metrics.total("retry.exhausted"), 1);
        assert_eq!(metrics.total("retry.attempt"), 2);
        // ExitCode doesn't implement PartialEq, so check via report format
        assert!(exit_code_is(ExitCode::from(&err), 4));
    }

    #[test]
    fn cumulative_wait_stays_within_bound() {
        let service = ScriptedService::new(vec![transient(), transient(), transient()]);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();
        let config = fast_config();
        let bound = config.retry.max_cumulative_delay();

        let _ = AnalysisOrchestrator::new(&service, &metrics, &clock, config)
            .run(&sample_request(AnalysisKind::Daily));

        assert!(clock.total_slept() <= bound);
    }

    #[test]
    fn non_retryable_failure_stops_immediately() {
        let service = ScriptedService::new(vec![Err(ServiceError::new(
            ServiceErrorKind::Unauthorized,
            "401",
        ))]);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap_err();

        assert!(matches!(err, PulseError::Transport(ref e) if e.kind == ServiceErrorKind::Unauthorized));
        assert_eq!(service.calls(), 1);
        assert!(clock.sleeps.borrow().is_empty());
        assert_eq!(metrics.total("retry.exhausted"), 0);
    }
}

mod responses {
    use super::*;

    #[test]
    fn unparseable_answer_counts_parse_failure() {
        let service = ScriptedService::answering("I cannot help with that.");
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Parse);
        assert_eq!(metrics.total("analysis.parse_failure"), 1);
        assert!(!metrics.timed("analysis.duration"));
    }

    #[test]
    fn fenced_answer_is_accepted() {
        let text = format!("Here you go:\n```json\n{}\n```", response_json(&[("AAA", "HOLD")]));
        let service = ScriptedService::answering(&text);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let result = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap();
        assert_eq!(result.recommendations[0].symbol, "AAA");
    }

    #[test]
    fn lower_case_symbols_match_request() {
        let instruments = vec![instrument("aaa", true), instrument("ccc", false)];
        let holdings = vec![Holding::new("aaa", 10.0)];
        let portfolio = PortfolioContext::build(&holdings, &snapshots_of(&instruments[..1])).unwrap();
        let request = AnalysisRequest::new(AnalysisKind::Daily, instruments).with_portfolio(portfolio);
        let service = ScriptedService::answering(&response_json(&[("aaa", "HOLD"), ("Ccc", "BUY")]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let result = run_one(&service, &metrics, &clock, &request).unwrap();

        assert_eq!(result.recommendations[0].symbol, "AAA");
        assert_eq!(result.recommendation_for("ccc").unwrap().action, Action::Buy);
        assert_eq!(metrics.total("analysis.validation_failure"), 0);
    }

    #[test]
    fn fractional_confidence_above_one_is_rejected() {
        let text = response_json(&[("AAA", "HOLD")]).replace("\"confidence\": 0.7", "\"confidence\": 1.5");
        let service = ScriptedService::answering(&text);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap_err();

        assert!(matches!(
            err,
            PulseError::Validation(ValidationError::OutOfRange { value, .. }) if value == 1.5
        ));
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let service = ScriptedService::answering(&response_json(&[("ZZZ", "BUY")]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap_err();

        assert!(matches!(
            err,
            PulseError::Validation(ValidationError::NotInRequest { ref symbol }) if symbol == "ZZZ"
        ));
        assert_eq!(metrics.total("analysis.validation_failure"), 1);
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let service = ScriptedService::answering(&response_json(&[("AAA", "BUY"), ("AAA", "HOLD")]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap_err();

        assert!(matches!(
            err,
            PulseError::Validation(ValidationError::DuplicateSymbol { .. })
        ));
        // ExitCode doesn't implement PartialEq, so check via report format
        assert!(exit_code_is(ExitCode::from(&err), 5));
    }

    #[test]
    fn daily_sell_on_watchlist_is_rejected() {
        let service = ScriptedService::answering(&response_json(&[("CCC", "SELL")]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap_err();

        assert!(matches!(
            err,
            PulseError::Validation(ValidationError::SellNotHeld { ref symbol }) if symbol == "CCC"
        ));
    }
}

mod bounds {
    use super::*;

    fn watchlist_request(count: usize) -> AnalysisRequest {
        let instruments = (0..count)
            .map(|i| instrument(&format!("W{i:03}"), false))
            .collect();
        AnalysisRequest::new(AnalysisKind::Daily, instruments)
    }

    #[test]
    fn large_request_prompt_is_bounded() {
        let service = ScriptedService::answering(&response_json(&[("W000", "BUY")]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();
        let config = fast_config();
        let limits = config.prompt.clone();
        let request = watchlist_request(70);

        let orchestrator = AnalysisOrchestrator::new(&service, &metrics, &clock, config);
        let prompt = orchestrator.prepare(&request).unwrap();

        assert!(prompt.text.chars().count() <= limits.max_prompt_chars);
        assert!(prompt.detailed <= limits.max_detailed_instruments);
        assert!(prompt.summarized <= limits.max_summarized_instruments);
        assert_eq!(prompt.detailed + prompt.summarized + prompt.omitted, 70);
        assert!(prompt.omitted >= 10);
        assert!(prompt.text.contains("more instruments omitted"));

        assert!(orchestrator.run(&request).is_ok());
    }

    #[test]
    fn too_many_instruments_is_malformed() {
        let service = ScriptedService::answering(&response_json(&[]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(
            &service,
            &metrics,
            &clock,
            &watchlist_request(MAX_REQUEST_INSTRUMENTS + 1),
        )
        .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::MalformedInput);
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn empty_request_is_malformed() {
        let service = ScriptedService::answering(&response_json(&[]));
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = run_one(&service, &metrics, &clock, &watchlist_request(0)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedInput);
    }

    #[test]
    fn snapshot_from_the_future_is_rejected() {
        let service = ScriptedService::answering(&response_json(&[]));
        let metrics = RecordingMetrics::default();
        let mut clock = FakeClock::new();
        clock.wall = start_date().and_hms_opt(0, 0, 0).unwrap().and_utc();

        let err = run_one(&service, &metrics, &clock, &sample_request(AnalysisKind::Daily)).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::MalformedInput);
    }
}

mod batch {
    use super::*;

    #[test]
    fn contradicting_kinds_produce_warning() {
        let service = ScriptedService::new(vec![
            Ok(response_json(&[("AAA", "BUY")])),
            Ok(response_json(&[("AAA", "SELL")])),
        ]);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();
        let requests = vec![
            sample_request(AnalysisKind::Daily),
            sample_request(AnalysisKind::Weekly),
        ];

        let outcome = AnalysisOrchestrator::new(&service, &metrics, &clock, fast_config())
            .run_batch(&requests)
            .unwrap();

        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.warnings.len(), 1);
        let warning = &outcome.warnings[0];
        assert_eq!(warning.symbol, "AAA");
        assert_eq!(warning.buy_in, vec![AnalysisKind::Daily]);
        assert_eq!(warning.sell_in, vec![AnalysisKind::Weekly]);
    }

    #[test]
    fn first_failure_aborts_batch() {
        let service = ScriptedService::new(vec![Ok("not json".to_string())]);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();
        let requests = vec![
            sample_request(AnalysisKind::Daily),
            sample_request(AnalysisKind::Weekly),
        ];

        let err = AnalysisOrchestrator::new(&service, &metrics, &clock, fast_config())
            .run_batch(&requests)
            .unwrap_err();

        assert_eq!(err.category(), ErrorCategory::Parse);
        assert_eq!(service.calls(), 1);
    }
}

mod end_to_end {
    use super::*;

    fn settings() -> RunSettings {
        RunSettings {
            data_directory: PathBuf::from("unused"),
            benchmark_symbol: Some("SPY".into()),
            indicators: IndicatorConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            output: None,
        }
    }

    fn data_port() -> MockDataPort {
        let closes = trending_closes(150, 100.0, 0.3);
        MockDataPort::new()
            .with_holding(
                Holding::new("AAA", 10.0).with_attribution("US", "Tech"),
                &closes,
            )
            .with_holding(
                Holding::new("BBB", 4.0).with_attribution("US", "Health"),
                &trending_closes(150, 50.0, -0.1),
            )
            .with_watch("CCC", &closes)
            .with_watch("AAA", &closes)
            .with_market("SPY", &trending_closes(150, 400.0, 0.5))
    }

    #[test]
    fn pipeline_runs_every_requested_kind() {
        let service = ScriptedService::new(vec![
            Ok(response_json(&[("AAA", "HOLD"), ("CCC", "BUY")])),
            Ok(response_json(&[("BBB", "SELL")])),
            Ok(response_json(&[("AAA", "HOLD")])),
        ]);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let outcome = cli::run_analysis_pipeline(
            &data_port(),
            &service,
            &clock,
            &metrics,
            &settings(),
            &[AnalysisKind::Daily, AnalysisKind::Weekly, AnalysisKind::Monthly],
        )
        .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.warnings.is_empty());
        assert_eq!(service.calls(), 3);

        let prompts = service.prompts.borrow();
        assert!(prompts[0].contains("SPY"));
        assert!(prompts.iter().all(|p| p.contains("CCC")));
    }

    #[test]
    fn watchlist_duplicate_of_holding_is_kept_once() {
        let port = data_port();
        let inputs = cli::load_inputs(&port, &settings()).unwrap();

        assert_eq!(inputs.holding_snapshots.len(), 2);
        assert_eq!(inputs.watchlist_snapshots.len(), 1);
        assert_eq!(inputs.watchlist_snapshots[0].symbol, "CCC");
        assert!(inputs.market.is_some());
    }

    #[test]
    fn requests_carry_portfolio_and_market() {
        let port = data_port();
        let settings = settings();
        let metrics = RecordingMetrics::default();
        let inputs = cli::load_inputs(&port, &settings).unwrap();
        let indicators = cli::compute_all_indicators(&inputs, &settings, &metrics).unwrap();
        let requests =
            cli::build_requests(&[AnalysisKind::Weekly], &inputs, &indicators, &settings).unwrap();

        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.instruments.len(), 3);
        let portfolio = request.portfolio.as_ref().unwrap();
        assert!(portfolio.benchmark.is_some());
        assert!(portfolio.volatility.is_some());
        assert_eq!(request.market.as_ref().unwrap().reference_symbol, "SPY");
    }

    #[test]
    fn missing_snapshot_surfaces_data_error() {
        let mut port = data_port();
        port.watchlist.push(WatchlistEntry {
            symbol: "NOPE".into(),
            name: None,
        });
        let service = ScriptedService::new(vec![]);
        let metrics = RecordingMetrics::default();
        let clock = FakeClock::new();

        let err = cli::run_analysis_pipeline(
            &port,
            &service,
            &clock,
            &metrics,
            &settings(),
            &[AnalysisKind::Daily],
        )
        .unwrap_err();

        assert!(matches!(err, PulseError::Data { .. }));
        assert_eq!(service.calls(), 0);
        // ExitCode doesn't implement PartialEq, so check via report format
        assert!(exit_code_is(ExitCode::from(&err), 3));
    }
}

//! Analysis orchestration: validate request, build prompt, call the
//! service under the retry policy, parse and validate the answer.

use crate::domain::analysis::{AnalysisRequest, AnalysisResult, MAX_REQUEST_INSTRUMENTS};
use crate::domain::error::PulseError;
use crate::domain::prompt::{build_prompt, KindProfile, Prompt, PromptConfig};
use crate::domain::response_parser::parse_response;
use crate::domain::retry::{RetryError, RetryPolicy};
use crate::domain::validation::{
    check_consistency, validate_indicators, validate_result, validate_snapshots,
    ConsistencyWarning,
};
use crate::ports::analysis_port::AnalysisPort;
use crate::ports::clock_port::Clock;
use crate::ports::metrics_port::MetricsPort;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, error, info};

pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub prompt: PromptConfig,
    pub retry: RetryPolicy,
    /// Wall-clock budget for one run, measured from the start of `run`.
    pub deadline: Option<Duration>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            prompt: PromptConfig::default(),
            retry: RetryPolicy::default(),
            deadline: Some(DEFAULT_DEADLINE),
        }
    }
}

/// Results of several runs plus any cross-result contradictions.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<AnalysisResult>,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Fails fast on anything the kind cannot work with.
pub fn validate_request(
    request: &AnalysisRequest,
    profile: &KindProfile,
    now: DateTime<Utc>,
) -> Result<(), PulseError> {
    if request.instruments.is_empty() {
        return Err(PulseError::malformed(format!(
            "{} request has no instruments",
            request.kind
        )));
    }
    if request.instruments.len() > MAX_REQUEST_INSTRUMENTS {
        return Err(PulseError::malformed(format!(
            "{} request has {} instruments (max {MAX_REQUEST_INSTRUMENTS})",
            request.kind,
            request.instruments.len()
        )));
    }

    let snapshots: Vec<_> = request.instruments.iter().map(|i| &i.snapshot).collect();
    validate_snapshots(&snapshots, now)?;

    for instrument in &request.instruments {
        match &instrument.indicators {
            Some(ind) => validate_indicators(ind)?,
            None if profile.requires_indicators => {
                return Err(PulseError::malformed(format!(
                    "{} analysis needs indicators for {}",
                    request.kind,
                    instrument.symbol()
                )));
            }
            None => {}
        }
    }

    if profile.requires_portfolio {
        let portfolio = request.portfolio.as_ref().ok_or_else(|| {
            PulseError::malformed(format!("{} analysis needs a portfolio", request.kind))
        })?;
        if profile.requires_attribution {
            let missing = portfolio.missing_attribution();
            if !missing.is_empty() {
                return Err(PulseError::Configuration {
                    reason: format!(
                        "{} analysis needs country and sector for every holding; missing for {}",
                        request.kind,
                        missing.join(", ")
                    ),
                });
            }
        }
    }
    Ok(())
}

/// Request validation plus prompt assembly, with no service involved.
pub fn prepare_prompt(
    request: &AnalysisRequest,
    config: &PromptConfig,
    now: DateTime<Utc>,
) -> Result<Prompt, PulseError> {
    let profile = KindProfile::for_kind(request.kind);
    validate_request(request, &profile, now)?;
    let prompt = build_prompt(request, &profile, config);
    debug!(
        kind = %request.kind,
        chars = prompt.text.len(),
        detailed = prompt.detailed,
        summarized = prompt.summarized,
        omitted = prompt.omitted,
        "prompt assembled"
    );
    Ok(prompt)
}

pub struct AnalysisOrchestrator<'a> {
    service: &'a dyn AnalysisPort,
    metrics: &'a dyn MetricsPort,
    clock: &'a dyn Clock,
    config: OrchestratorConfig,
}

impl<'a> AnalysisOrchestrator<'a> {
    pub fn new(
        service: &'a dyn AnalysisPort,
        metrics: &'a dyn MetricsPort,
        clock: &'a dyn Clock,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            service,
            metrics,
            clock,
            config,
        }
    }

    /// Validates the request and assembles the bounded prompt without
    /// calling the service.
    pub fn prepare(&self, request: &AnalysisRequest) -> Result<Prompt, PulseError> {
        prepare_prompt(request, &self.config.prompt, self.clock.utc_now())
    }

    pub fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResult, PulseError> {
        let start = self.clock.now();
        let prompt = self.prepare(request)?;
        let deadline = self.config.deadline.map(|d| start + d);

        let outcome = self
            .config
            .retry
            .execute(self.clock, deadline, |attempt| {
                debug!(kind = %request.kind, attempt, "calling analysis service");
                self.service.generate(&prompt.text)
            })
            .map_err(|e| {
                let retries = e.attempts().saturating_sub(1);
                if retries > 0 {
                    self.metrics.increment("retry.attempt", u64::from(retries));
                }
                if matches!(
                    e,
                    RetryError::Exhausted { .. } | RetryError::DeadlineExceeded { .. }
                ) {
                    self.metrics.increment("retry.exhausted", 1);
                }
                error!(kind = %request.kind, error = %e, "analysis service call failed");
                PulseError::from(e)
            })?;
        if outcome.retries > 0 {
            self.metrics
                .increment("retry.attempt", u64::from(outcome.retries));
        }

        let result = parse_response(&outcome.value, request.kind, self.clock.utc_now())
            .map_err(|e| {
                self.metrics.increment("analysis.parse_failure", 1);
                error!(kind = %request.kind, error = %e, "could not parse analysis response");
                PulseError::from(e)
            })?;

        validate_result(&result, request).map_err(|e| {
            self.metrics.increment("analysis.validation_failure", 1);
            error!(kind = %request.kind, error = %e, "analysis result rejected");
            PulseError::from(e)
        })?;

        let elapsed = self.clock.now().duration_since(start);
        self.metrics.timing("analysis.duration", elapsed);
        info!(
            kind = %request.kind,
            recommendations = result.recommendations.len(),
            retries = outcome.retries,
            elapsed_ms = elapsed.as_millis() as u64,
            "analysis complete"
        );
        Ok(result)
    }

    /// Runs each request in order and checks the results against each other.
    /// The first failing run aborts the batch.
    pub fn run_batch(&self, requests: &[AnalysisRequest]) -> Result<BatchOutcome, PulseError> {
        let results = requests
            .iter()
            .map(|r| self.run(r))
            .collect::<Result<Vec<_>, _>>()?;
        let warnings = check_consistency(&results);
        Ok(BatchOutcome { results, warnings })
    }
}

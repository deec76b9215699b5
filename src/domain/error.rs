//! Domain error types.
//!
//! Every failure carries an [`ErrorCategory`] so the caller can decide how
//! loudly to report it. Only [`ErrorCategory::InsufficientData`] is absorbed
//! inside the core (by the indicator aggregator); everything else propagates.

use std::fmt;

/// Coarse classification attached to every error that leaves the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    InsufficientData,
    MalformedInput,
    Transient,
    RetryExhausted,
    Parse,
    Validation,
    Configuration,
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCategory::InsufficientData => "insufficient-data",
            ErrorCategory::MalformedInput => "malformed-input",
            ErrorCategory::Transient => "transient",
            ErrorCategory::RetryExhausted => "retry-exhausted",
            ErrorCategory::Parse => "parse",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Io => "io",
        };
        f.write_str(name)
    }
}

/// Failure of a single indicator computation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IndicatorError {
    #[error("insufficient data for {indicator}: have {have} points, need {need}")]
    InsufficientData {
        indicator: String,
        have: usize,
        need: usize,
    },

    #[error("malformed input for {indicator}: {reason}")]
    MalformedInput { indicator: String, reason: String },
}

impl IndicatorError {
    pub fn insufficient(indicator: impl fmt::Display, have: usize, need: usize) -> Self {
        IndicatorError::InsufficientData {
            indicator: indicator.to_string(),
            have,
            need,
        }
    }

    pub fn malformed(indicator: impl fmt::Display, reason: impl Into<String>) -> Self {
        IndicatorError::MalformedInput {
            indicator: indicator.to_string(),
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            IndicatorError::InsufficientData { .. } => ErrorCategory::InsufficientData,
            IndicatorError::MalformedInput { .. } => ErrorCategory::MalformedInput,
        }
    }
}

/// How the external analysis service failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceErrorKind {
    Timeout,
    Network,
    RateLimited,
    Unavailable,
    Unauthorized,
    BadRequest,
    Rejected,
}

impl fmt::Display for ServiceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceErrorKind::Timeout => "timeout",
            ServiceErrorKind::Network => "network error",
            ServiceErrorKind::RateLimited => "rate limited",
            ServiceErrorKind::Unavailable => "service unavailable",
            ServiceErrorKind::Unauthorized => "unauthorized",
            ServiceErrorKind::BadRequest => "bad request",
            ServiceErrorKind::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Transport-level failure reported by an [`AnalysisPort`](crate::ports::analysis_port::AnalysisPort).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    pub kind: ServiceErrorKind,
    pub message: String,
}

impl ServiceError {
    pub fn new(kind: ServiceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Timeouts, network faults, rate limiting and 5xx-style outages are
    /// worth another attempt; anything the service rejected outright is not.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ServiceErrorKind::Timeout
            | ServiceErrorKind::Network
            | ServiceErrorKind::RateLimited
            | ServiceErrorKind::Unavailable => true,
            ServiceErrorKind::Unauthorized
            | ServiceErrorKind::BadRequest
            | ServiceErrorKind::Rejected => false,
        }
    }
}

/// The analysis service answered but the text could not be read as a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("empty response")]
    Empty,

    #[error("no JSON object found in response")]
    NoJson,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}

/// A parsed result, indicator record or request that breaks a business rule.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate recommendation for symbol {symbol}")]
    DuplicateSymbol { symbol: String },

    #[error("recommendation for {symbol} which is not in the request")]
    NotInRequest { symbol: String },

    #[error("SELL recommended for {symbol} which is not held")]
    SellNotHeld { symbol: String },

    #[error("{field} out of range: {value} not in [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must not be empty")]
    Empty { field: String },

    #[error("inconsistent {field}: {reason}")]
    Inconsistent { field: String, reason: String },

    #[error("too many recommendations: {count} (max {max})")]
    TooMany { count: usize, max: usize },
}

/// Top-level error type for stockpulse.
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error(transparent)]
    Indicator(#[from] IndicatorError),

    #[error("data source error: {reason}")]
    Data { reason: String },

    #[error("analysis service failed: {0}")]
    Transport(ServiceError),

    #[error("analysis service still failing after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: ServiceError },

    #[error("deadline exceeded after {attempts} attempts: {last}")]
    DeadlineExceeded { attempts: u32, last: ServiceError },

    #[error("could not parse analysis response: {0}")]
    Parse(#[from] ParseError),

    #[error("analysis result failed validation: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PulseError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        PulseError::MalformedInput {
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PulseError::ConfigParse { .. }
            | PulseError::ConfigMissing { .. }
            | PulseError::ConfigInvalid { .. }
            | PulseError::Configuration { .. } => ErrorCategory::Configuration,
            PulseError::MalformedInput { .. } => ErrorCategory::MalformedInput,
            PulseError::Indicator(e) => e.category(),
            PulseError::Data { .. } | PulseError::Io(_) => ErrorCategory::Io,
            PulseError::Transport(_) => ErrorCategory::Transient,
            PulseError::RetryExhausted { .. } | PulseError::DeadlineExceeded { .. } => {
                ErrorCategory::RetryExhausted
            }
            PulseError::Parse(_) => ErrorCategory::Parse,
            PulseError::Validation(_) => ErrorCategory::Validation,
        }
    }
}

impl From<&PulseError> for std::process::ExitCode {
    fn from(err: &PulseError) -> Self {
        let code: u8 = match err {
            PulseError::Io(_) => 1,
            PulseError::ConfigParse { .. }
            | PulseError::ConfigMissing { .. }
            | PulseError::ConfigInvalid { .. }
            | PulseError::Configuration { .. } => 2,
            PulseError::MalformedInput { .. }
            | PulseError::Indicator(_)
            | PulseError::Data { .. } => 3,
            PulseError::Transport(_)
            | PulseError::RetryExhausted { .. }
            | PulseError::DeadlineExceeded { .. } => 4,
            PulseError::Parse(_) | PulseError::Validation(_) => 5,
        };
        std::process::ExitCode::from(code)
    }
}

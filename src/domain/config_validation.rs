//! Configuration validation.
//!
//! Checks every INI section before a run so bad values fail with the
//! section and key that caused them.

use crate::domain::error::PulseError;
use crate::domain::indicator::{bollinger, breakout, macd, moving_average, rsi};
use crate::domain::{prompt, retry};
use crate::ports::config_port::ConfigPort;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), PulseError> {
    validate_data(config)?;
    validate_indicator_windows(config)?;
    validate_retry(config)?;
    validate_analysis(config)?;
    validate_gemini(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> PulseError {
    PulseError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn require_at_least(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
) -> Result<i64, PulseError> {
    let value = config.get_int(section, key, default);
    if value < min {
        return Err(invalid(section, key, format!("{key} must be at least {min}")));
    }
    Ok(value)
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), PulseError> {
    match config.get_string("data", "directory") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(PulseError::ConfigMissing {
            section: "data".to_string(),
            key: "directory".to_string(),
        }),
    }
}

fn validate_indicator_windows(config: &dyn ConfigPort) -> Result<(), PulseError> {
    let short = require_at_least(
        config,
        "indicators",
        "short_window",
        moving_average::DEFAULT_SHORT as i64,
        1,
    )?;
    let long = require_at_least(
        config,
        "indicators",
        "long_window",
        moving_average::DEFAULT_LONG as i64,
        1,
    )?;
    if short >= long {
        return Err(invalid(
            "indicators",
            "short_window",
            "short_window must be less than long_window",
        ));
    }

    require_at_least(
        config,
        "indicators",
        "breakout_lookback",
        breakout::DEFAULT_LOOKBACK as i64,
        1,
    )?;
    require_at_least(config, "indicators", "support_resistance_lookback", 0, 0)?;
    require_at_least(config, "indicators", "rsi_period", rsi::DEFAULT_PERIOD as i64, 1)?;

    let fast = require_at_least(config, "indicators", "macd_fast", macd::DEFAULT_FAST as i64, 1)?;
    let slow = require_at_least(config, "indicators", "macd_slow", macd::DEFAULT_SLOW as i64, 1)?;
    require_at_least(config, "indicators", "macd_signal", macd::DEFAULT_SIGNAL as i64, 1)?;
    if fast >= slow {
        return Err(invalid(
            "indicators",
            "macd_fast",
            "macd_fast must be less than macd_slow",
        ));
    }

    require_at_least(
        config,
        "indicators",
        "bollinger_period",
        bollinger::DEFAULT_PERIOD as i64,
        1,
    )?;
    let multiplier = config.get_double(
        "indicators",
        "bollinger_multiplier",
        f64::from(bollinger::DEFAULT_STDDEV_MULT_X100) / 100.0,
    );
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return Err(invalid(
            "indicators",
            "bollinger_multiplier",
            "bollinger_multiplier must be positive",
        ));
    }
    Ok(())
}

fn validate_retry(config: &dyn ConfigPort) -> Result<(), PulseError> {
    require_at_least(
        config,
        "retry",
        "max_attempts",
        i64::from(retry::DEFAULT_MAX_ATTEMPTS),
        1,
    )?;

    let base = config.get_double(
        "retry",
        "base_delay_secs",
        retry::DEFAULT_BASE_DELAY.as_secs_f64(),
    );
    if !base.is_finite() || base < 0.0 {
        return Err(invalid(
            "retry",
            "base_delay_secs",
            "base_delay_secs must be non-negative",
        ));
    }
    let max = config.get_double(
        "retry",
        "max_delay_secs",
        retry::DEFAULT_MAX_DELAY.as_secs_f64(),
    );
    if !max.is_finite() || max < base {
        return Err(invalid(
            "retry",
            "max_delay_secs",
            "max_delay_secs must be at least base_delay_secs",
        ));
    }
    Ok(())
}

fn validate_analysis(config: &dyn ConfigPort) -> Result<(), PulseError> {
    require_at_least(
        config,
        "analysis",
        "max_detailed_instruments",
        prompt::DEFAULT_MAX_DETAILED as i64,
        1,
    )?;
    require_at_least(
        config,
        "analysis",
        "max_summarized_instruments",
        prompt::DEFAULT_MAX_SUMMARIZED as i64,
        1,
    )?;
    require_at_least(
        config,
        "analysis",
        "max_prompt_chars",
        prompt::DEFAULT_MAX_PROMPT_CHARS as i64,
        1,
    )?;
    require_at_least(config, "analysis", "deadline_secs", 600, 1)?;
    Ok(())
}

fn validate_gemini(config: &dyn ConfigPort) -> Result<(), PulseError> {
    let temperature = config.get_double("gemini", "temperature", 0.1);
    if !(0.0..=2.0).contains(&temperature) {
        return Err(invalid(
            "gemini",
            "temperature",
            "temperature must be between 0 and 2",
        ));
    }
    require_at_least(config, "gemini", "max_output_tokens", 8192, 1)?;
    require_at_least(config, "gemini", "timeout_secs", 60, 1)?;
    if let Some(model) = config.get_string("gemini", "model") {
        if model.trim().is_empty() {
            return Err(invalid("gemini", "model", "model must not be empty"));
        }
    }
    Ok(())
}

//! Volume change rate: `(current / mean(history) - 1) * 100`.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{mean, require_len, IndicatorKind};

/// Percentage above (+) or below (-) the historical mean volume. A history
/// whose mean is zero gives no baseline: 0 when the current volume is also
/// zero, insufficient data otherwise.
pub fn volume_change_rate(current: f64, history: &[f64]) -> Result<f64, IndicatorError> {
    let kind = IndicatorKind::VolumeChange;
    require_len(kind, history, 1)?;
    if !current.is_finite() || current < 0.0 {
        return Err(IndicatorError::malformed(
            kind,
            format!("current volume must be finite and non-negative, got {current}"),
        ));
    }

    let avg = mean(history);
    if avg == 0.0 {
        if current == 0.0 {
            return Ok(0.0);
        }
        return Err(IndicatorError::insufficient(kind, 0, 1));
    }
    Ok((current / avg - 1.0) * 100.0)
}

//! Pearson correlation between an instrument and a reference series.

use crate::domain::error::IndicatorError;
use crate::domain::indicator::{mean, require_len, IndicatorKind};

/// Both slices must already be aligned on the same dates. Returns 0 when
/// either series has zero variance.
pub fn correlation(series: &[f64], reference: &[f64]) -> Result<f64, IndicatorError> {
    let kind = IndicatorKind::Correlation;
    if series.len() != reference.len() {
        return Err(IndicatorError::malformed(
            kind,
            format!(
                "series lengths differ: {} vs {}",
                series.len(),
                reference.len()
            ),
        ));
    }
    require_len(kind, series, 2)?;

    let mean_x = mean(series);
    let mean_y = mean(reference);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in series.iter().zip(reference) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return Ok(0.0);
    }
    Ok((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

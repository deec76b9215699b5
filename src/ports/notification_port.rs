//! Result delivery port.

use crate::domain::analysis::AnalysisResult;
use crate::domain::error::PulseError;

pub trait NotificationPort {
    fn publish(&self, result: &AnalysisResult) -> Result<(), PulseError>;

    /// Default implementation: publishes each result in order.
    fn publish_all(&self, results: &[AnalysisResult]) -> Result<(), PulseError> {
        for result in results {
            self.publish(result)?;
        }
        Ok(())
    }
}

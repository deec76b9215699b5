//! External analysis service port.

use crate::domain::error::ServiceError;

/// Sends a prompt to the judgment service and returns its raw text answer.
pub trait AnalysisPort {
    fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

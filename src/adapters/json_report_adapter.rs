//! Writes analysis results to a JSON file.

use crate::domain::analysis::AnalysisResult;
use crate::domain::error::PulseError;
use crate::ports::notification_port::NotificationPort;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

pub struct JsonFileAdapter {
    path: PathBuf,
}

impl JsonFileAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), PulseError> {
        let json = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;
        info!(path = %self.path.display(), "analysis written");
        Ok(())
    }
}

impl NotificationPort for JsonFileAdapter {
    fn publish(&self, result: &AnalysisResult) -> Result<(), PulseError> {
        self.write(result)
    }

    /// Writes one JSON array instead of overwriting the file per result.
    fn publish_all(&self, results: &[AnalysisResult]) -> Result<(), PulseError> {
        self.write(results)
    }
}

//! Concrete adapter implementations for ports.

pub mod csv_adapter;
pub mod file_config_adapter;
#[cfg(feature = "gemini")]
pub mod gemini_adapter;
pub mod json_report_adapter;
pub mod system_clock;
pub mod tracing_metrics;

//! Core domain types and logic.

pub mod aggregator;
pub mod analysis;
pub mod config_validation;
pub mod error;
pub mod indicator;
pub mod instrument;
pub mod orchestrator;
pub mod portfolio;
pub mod prompt;
pub mod response_parser;
pub mod retry;
pub mod series;
pub mod validation;

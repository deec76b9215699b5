//! Port traits at the edge of the domain.

pub mod analysis_port;
pub mod clock_port;
pub mod config_port;
pub mod data_port;
pub mod metrics_port;
pub mod notification_port;

pub mod config;
pub mod errors;
pub mod logging;
pub mod units;

pub use config::{AppConfig, HostConfig, LogFormat, ObservabilityConfig};
pub use errors::*;

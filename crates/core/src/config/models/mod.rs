pub mod app_config;
pub mod host;
pub mod observability;

// Re-export main types for easier imports
pub use app_config::AppConfig;
pub use host::HostConfig;
pub use observability::{LogFormat, ObservabilityConfig};

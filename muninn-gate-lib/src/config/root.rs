use serde::Deserialize;
use std::net::SocketAddr;

use super::limit::LimitConfig;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Address and port to listen on
    /// Example: "0.0.0.0:7000" or "127.0.0.1:8080"
    pub listen: SocketAddr,
    /// Upstream server admitted requests are forwarded to
    /// Example: "127.0.0.1:3000" or "backend.internal:8080"
    pub upstream: String,
    /// Admission control configuration (optional)
    /// If not provided, the gate forwards everything untouched
    /// Default: None
    #[serde(default)]
    pub limit: Option<LimitConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
/// Controls application-level structured logging (stdout/stderr)
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    /// Default: "info"
    /// Can be overridden at runtime via RUST_LOG environment variable
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Show module path (target) in log messages
    /// Default: false
    #[serde(default)]
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), show_target: false }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

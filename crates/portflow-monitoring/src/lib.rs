//! Logging setup for Portflow services.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::env;
use tracing::warn;

/// Structured logging
pub mod logging;
pub use logging::{init_logging, init_test_tracing, LogExt};

/// Environment variable holding the log filter
pub const ENV_LOG_FILTER: &str = "LOG_FILTER";
/// Environment variable selecting `json` or `pretty` output
pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
/// Environment variable holding the service name
pub const ENV_SERVICE_NAME: &str = "SERVICE_NAME";

/// Configuration for initializing logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoringConfig {
    /// Service name attached to startup logs
    pub service_name: String,
    /// Log level filter (e.g., "info,portflow_core=debug")
    pub log_filter: String,
    /// Emit JSON lines instead of pretty output
    pub enable_json_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "portflow".to_string(),
            log_filter: "info".to_string(),
            enable_json_logging: false,
        }
    }
}

impl MonitoringConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup(ENV_SERVICE_NAME).filter(|v| !v.trim().is_empty()) {
            config.service_name = name;
        }

        if let Some(filter) = lookup(ENV_LOG_FILTER).filter(|v| !v.trim().is_empty()) {
            config.log_filter = filter;
        }

        if let Some(format) = lookup(ENV_LOG_FORMAT) {
            match format.trim().to_ascii_lowercase().as_str() {
                "json" => config.enable_json_logging = true,
                "pretty" => config.enable_json_logging = false,
                other => warn!("Invalid {} value: {}", ENV_LOG_FORMAT, other),
            }
        }

        config
    }
}

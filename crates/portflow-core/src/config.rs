//! Engine configuration
//!
//! Defaults are overridden from environment variables. Invalid values are
//! logged and ignored so a typo never prevents the engine from starting.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{info, warn};

use crate::resilience::CircuitBreakerConfig;
use crate::CoreError;

/// Environment variable for the default undo retry limit
pub const ENV_MAX_UNDO_RETRY: &str = "MAXUNDORETRY";
/// Environment variable for the default undo timeout in milliseconds
pub const ENV_UNDO_TIMEOUT: &str = "UNDOTIMEOUT";
/// Environment variable for the default forward port timeout in milliseconds
pub const ENV_PORT_TIMEOUT: &str = "PORTTIMEOUT";
/// Environment variable for the default forward retry budget
pub const ENV_PORT_MAX_RETRY: &str = "PORTMAXRETRY";

/// Configuration consumed by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Undo retry limit for ports that do not set `retries`
    #[serde(default = "default_undo_retry_limit")]
    pub undo_retry_limit: u32,

    /// Undo timeout for ports that do not set `timeout`
    #[serde(default = "default_undo_timeout_ms")]
    pub undo_timeout_ms: u64,

    /// Forward call timeout for ports that do not set `timeout`
    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    /// Forward retry budget for ports that do not set `forward_retries`
    #[serde(default = "default_port_max_retry")]
    pub port_max_retry: u32,

    /// Breaker thresholds for ports without their own configuration
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

fn default_undo_retry_limit() -> u32 {
    3
}

fn default_undo_timeout_ms() -> u64 {
    60_000
}

fn default_port_timeout_ms() -> u64 {
    12_000
}

fn default_port_max_retry() -> u32 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            undo_retry_limit: default_undo_retry_limit(),
            undo_timeout_ms: default_undo_timeout_ms(),
            port_timeout_ms: default_port_timeout_ms(),
            port_max_retry: default_port_max_retry(),
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    ///
    /// `from_env` delegates here; tests pass a map instead of mutating the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_MAX_UNDO_RETRY) {
            match value.trim().parse::<u32>() {
                Ok(limit) => config.undo_retry_limit = limit,
                Err(_) => warn!("Invalid {} value: {}", ENV_MAX_UNDO_RETRY, value),
            }
        }

        if let Some(value) = lookup(ENV_UNDO_TIMEOUT) {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.undo_timeout_ms = ms,
                Err(_) => warn!("Invalid {} value: {}", ENV_UNDO_TIMEOUT, value),
            }
        }

        if let Some(value) = lookup(ENV_PORT_TIMEOUT) {
            match value.trim().parse::<u64>() {
                Ok(ms) => config.port_timeout_ms = ms,
                Err(_) => warn!("Invalid {} value: {}", ENV_PORT_TIMEOUT, value),
            }
        }

        if let Some(value) = lookup(ENV_PORT_MAX_RETRY) {
            match value.trim().parse::<u32>() {
                Ok(retries) => config.port_max_retry = retries,
                Err(_) => warn!("Invalid {} value: {}", ENV_PORT_MAX_RETRY, value),
            }
        }

        config.validate()?;

        info!(
            undo_retry_limit = config.undo_retry_limit,
            undo_timeout_ms = config.undo_timeout_ms,
            port_timeout_ms = config.port_timeout_ms,
            port_max_retry = config.port_max_retry,
            "Engine configuration loaded"
        );

        Ok(config)
    }

    /// Reject values that would make every call time out immediately
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.undo_timeout_ms == 0 {
            return Err(CoreError::ConfigurationError(
                "Undo timeout must be greater than zero".to_string(),
            ));
        }
        if self.port_timeout_ms == 0 {
            return Err(CoreError::ConfigurationError(
                "Port timeout must be greater than zero".to_string(),
            ));
        }
        self.circuit_breaker.validate()
    }

    /// Default undo timeout as a duration
    pub fn undo_timeout(&self) -> Duration {
        Duration::from_millis(self.undo_timeout_ms)
    }

    /// Default forward timeout as a duration
    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }
}

//! Common configuration types for the AP2 receiver crates.

use crate::error::{ReceiverError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;

/// Default log filter when `AP2_LOG_LEVEL` and `RUST_LOG` are unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log filter directive (e.g. `info`, `stream_controller=debug`)
    pub log_level: String,
    /// Enable JSON-formatted logs
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    /// Load from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::Configuration` if `AP2_JSON_LOGS` is not a boolean.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ReceiverError::Configuration` if `AP2_JSON_LOGS` is not a boolean.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let log_level = vars
            .get("AP2_LOG_LEVEL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let json_logs = match vars.get("AP2_JSON_LOGS") {
            Some(value) => value.parse().map_err(|_| {
                ReceiverError::Configuration(format!(
                    "AP2_JSON_LOGS must be true or false, got '{value}'"
                ))
            })?,
            None => false,
        };

        Ok(Self {
            log_level,
            json_logs,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = ObservabilityConfig::from_vars(&HashMap::new()).unwrap();
        assert_eq!(config, ObservabilityConfig::default());
    }

    #[test]
    fn test_reads_overrides() {
        let vars = HashMap::from([
            ("AP2_LOG_LEVEL".to_string(), "stream_controller=trace".to_string()),
            ("AP2_JSON_LOGS".to_string(), "true".to_string()),
        ]);

        let config = ObservabilityConfig::from_vars(&vars).unwrap();
        assert_eq!(config.log_level, "stream_controller=trace");
        assert!(config.json_logs);
    }

    #[test]
    fn test_rejects_bad_json_flag() {
        let vars = HashMap::from([("AP2_JSON_LOGS".to_string(), "yes".to_string())]);

        let err = ObservabilityConfig::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ReceiverError::Configuration(msg) if msg.contains("AP2_JSON_LOGS")));
    }
}

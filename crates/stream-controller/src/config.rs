//! Stream core configuration.
//!
//! Loaded from environment variables with defaults matching the reference
//! receiver. The insecure all-zero session key fallback is off unless
//! explicitly enabled, so unencrypted test sessions are a visible opt-in.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default realtime jitter-buffer multiplier applied to `latencyMin`.
pub const DEFAULT_BUFFER_MULTIPLIER: u32 = 4;

/// Default budget for waiting on a sample-delay report.
pub const DEFAULT_SAMPLE_DELAY_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default budget for waiting on an anchor report after a flush.
pub const DEFAULT_ANCHOR_TIMEOUT: Duration = Duration::from_millis(500);

/// Stream core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Multiplier applied to `latencyMin` when sizing realtime buffers.
    ///
    /// Larger values tolerate more jitter at the cost of added sync latency.
    pub buffer_multiplier: u32,

    /// Budget for `Stream::acquire_sample_delay`.
    pub sample_delay_timeout: Duration,

    /// Budget for `Stream::refresh_anchor`.
    pub anchor_timeout: Duration,

    /// Fall back to a 32-byte all-zero session key when the description and
    /// the caller supply none. Only meant for unencrypted test senders.
    pub allow_insecure_default_key: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            buffer_multiplier: DEFAULT_BUFFER_MULTIPLIER,
            sample_delay_timeout: DEFAULT_SAMPLE_DELAY_TIMEOUT,
            anchor_timeout: DEFAULT_ANCHOR_TIMEOUT,
            allow_insecure_default_key: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let buffer_multiplier =
            parse_var(vars, "AP2_BUFFER_MULTIPLIER")?.unwrap_or(DEFAULT_BUFFER_MULTIPLIER);

        let sample_delay_timeout = parse_var::<u64>(vars, "AP2_SAMPLE_DELAY_TIMEOUT_MS")?
            .map_or(DEFAULT_SAMPLE_DELAY_TIMEOUT, Duration::from_millis);

        let anchor_timeout = parse_var::<u64>(vars, "AP2_ANCHOR_TIMEOUT_MS")?
            .map_or(DEFAULT_ANCHOR_TIMEOUT, Duration::from_millis);

        let allow_insecure_default_key =
            parse_var(vars, "AP2_ALLOW_INSECURE_DEFAULT_KEY")?.unwrap_or(false);

        if buffer_multiplier == 0 {
            return Err(ConfigError::InvalidValue(
                "AP2_BUFFER_MULTIPLIER must be at least 1".to_string(),
            ));
        }

        Ok(Config {
            buffer_multiplier,
            sample_delay_timeout,
            anchor_timeout,
            allow_insecure_default_key,
        })
    }
}

fn parse_var<T: FromStr>(
    vars: &HashMap<String, String>,
    name: &str,
) -> Result<Option<T>, ConfigError> {
    match vars.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(format!("{name}='{raw}'"))),
        None => Ok(None),
    }
}

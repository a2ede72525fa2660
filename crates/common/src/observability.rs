//! Tracing subscriber setup shared by receiver binaries and test harnesses.

use crate::config::ObservabilityConfig;
use crate::error::{ReceiverError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
///
/// # Errors
///
/// Returns `ReceiverError::Observability` if the filter directive is invalid
/// or a global subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            ReceiverError::Observability(format!("invalid log filter '{}': {e}", config.log_level))
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| ReceiverError::Observability(format!("subscriber already set: {e}")))
}

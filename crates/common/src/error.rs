//! Common error types for the AP2 receiver crates.

use thiserror::Error;

/// Errors shared by the receiver crates outside the stream core.
#[derive(Error, Debug)]
pub enum ReceiverError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Observability (tracing/metrics) setup failed
    #[error("Observability error: {0}")]
    Observability(String),
}

/// Result type alias using `ReceiverError`
pub type Result<T> = std::result::Result<T, ReceiverError>;

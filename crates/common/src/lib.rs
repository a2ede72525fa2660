//! Common utilities and types shared across the AP2 receiver crates.

#![warn(clippy::pedantic)]

/// Module for common error types
pub mod error;

/// Module for stream identifiers and identifier sources
pub mod types;

/// Module for common configuration
pub mod config;

/// Module for secret types that keep key material out of logs
pub mod secret;

/// Module for tracing subscriber setup
pub mod observability;

//! Observability for the stream core.
//!
//! Log events use the `ap2.stream` target family and carry `stream_id` and
//! `stream_type` fields. Key material is never logged; it is held in
//! `secrecy` wrappers whose `Debug` output is redacted.
//!
//! # Metrics
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `ap2_stream_setup_total` | Counter | `stream_type`, `status` | Stream construction attempts |
//! | `ap2_stream_setup_failures_total` | Counter | `reason` | Construction failures by cause |
//! | `ap2_timing_poll_total` | Counter | `kind`, `outcome` | Sample delay / anchor polls |
//! | `ap2_timing_poll_duration_seconds` | Histogram | `kind` | Time spent waiting in a poll |
//! | `ap2_stream_teardown_total` | Counter | `status` | Teardowns that did work |
//!
//! No recorder is installed here; the host application installs one.

pub mod metrics;

pub use self::metrics::{
    record_setup, record_setup_failure, record_teardown, record_timing_poll, PollKind,
};

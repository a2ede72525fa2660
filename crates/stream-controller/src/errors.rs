//! Stream core error types.
//!
//! Construction errors abort stream creation and are surfaced to the session
//! layer, which decides whether to fail the whole SETUP or retry. Timing poll
//! timeouts are not errors; those operations return `bool`.

use std::net::SocketAddr;
use thiserror::Error;

use crate::endpoint::EndpointKind;
use crate::worker::WorkerKind;

/// Stream core error type.
#[derive(Debug, Error)]
pub enum StreamError {
    /// A required field is missing from (or has the wrong type in) the
    /// session description.
    #[error("Malformed stream description: {0}")]
    MalformedStreamDescription(String),

    /// Non-positive latency or frame size for a realtime stream.
    #[error("Invalid latency parameters: latencyMin={latency_min}, spf={samples_per_frame}")]
    InvalidLatencyParameters {
        latency_min: i128,
        samples_per_frame: i128,
    },

    /// No free endpoint could be bound.
    #[error("Endpoint allocation failed: {0}")]
    EndpointAllocationFailed(#[from] AllocationError),

    /// A worker failed to start.
    #[error("Worker spawn failed: {0}")]
    Spawn(#[from] SpawnError),

    /// The audio worker is gone (stream culled) or the stream has none.
    #[error("Audio worker unavailable")]
    WorkerUnavailable,

    /// One or more workers did not exit cleanly during teardown.
    #[error("Teardown error: {0}")]
    Teardown(String),

    /// Descriptor encoding or description decoding failed.
    #[error("Codec error: {0}")]
    Codec(String),
}

impl StreamError {
    /// Bounded label for metrics.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            StreamError::MalformedStreamDescription(_) => "malformed_description",
            StreamError::InvalidLatencyParameters { .. } => "invalid_latency",
            StreamError::EndpointAllocationFailed(_) => "endpoint_allocation",
            StreamError::Spawn(_) => "spawn",
            StreamError::WorkerUnavailable => "worker_unavailable",
            StreamError::Teardown(_) => "teardown",
            StreamError::Codec(_) => "codec",
        }
    }
}

/// Failure to bind a local endpoint.
#[derive(Debug, Error)]
#[error("cannot bind {kind} endpoint on {addr}: {source}")]
pub struct AllocationError {
    /// Address the bind was attempted on.
    pub addr: SocketAddr,
    /// Requested socket kind.
    pub kind: EndpointKind,
    /// Underlying I/O error.
    #[source]
    pub source: std::io::Error,
}

/// Failure to start a worker.
#[derive(Debug, Error)]
#[error("{worker} worker: {reason}")]
pub struct SpawnError {
    /// Which worker failed.
    pub worker: WorkerKind,
    /// Human-readable cause.
    pub reason: String,
}

impl SpawnError {
    /// Create a spawn error for `worker`.
    #[must_use]
    pub fn new(worker: WorkerKind, reason: impl Into<String>) -> Self {
        Self {
            worker,
            reason: reason.into(),
        }
    }
}

/// A worker did not exit cleanly when asked to terminate.
#[derive(Debug, Error)]
#[error("{worker} worker did not exit cleanly: {reason}")]
pub struct ExitError {
    /// Which worker.
    pub worker: WorkerKind,
    /// Panic or cancellation reported by the runtime.
    pub reason: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_reason_labels_are_distinct() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let errors = [
            StreamError::MalformedStreamDescription("type".to_string()),
            StreamError::InvalidLatencyParameters {
                latency_min: 0,
                samples_per_frame: 352,
            },
            StreamError::EndpointAllocationFailed(AllocationError {
                addr,
                kind: EndpointKind::Datagram,
                source: io::Error::from(io::ErrorKind::AddrInUse),
            }),
            StreamError::Spawn(SpawnError::new(WorkerKind::Control, "boom")),
            StreamError::WorkerUnavailable,
            StreamError::Teardown("join".to_string()),
            StreamError::Codec("plist".to_string()),
        ];

        let mut labels: Vec<_> = errors.iter().map(StreamError::reason).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), errors.len());
    }

    #[test]
    fn test_display_formatting() {
        assert_eq!(
            StreamError::MalformedStreamDescription("missing 'type'".to_string()).to_string(),
            "Malformed stream description: missing 'type'"
        );

        assert_eq!(
            StreamError::InvalidLatencyParameters {
                latency_min: 0,
                samples_per_frame: 352
            }
            .to_string(),
            "Invalid latency parameters: latencyMin=0, spf=352"
        );

        assert_eq!(
            StreamError::Spawn(SpawnError::new(WorkerKind::RealtimeAudio, "no runtime"))
                .to_string(),
            "Worker spawn failed: realtime audio worker: no runtime"
        );
    }

    #[test]
    fn test_allocation_error_conversion() {
        let alloc = AllocationError {
            addr: "127.0.0.1:7000".parse().unwrap(),
            kind: EndpointKind::Stream,
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        let err: StreamError = alloc.into();

        assert!(matches!(err, StreamError::EndpointAllocationFailed(_)));
        assert!(err.to_string().contains("stream endpoint on 127.0.0.1:7000"));
    }
}

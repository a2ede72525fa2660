//! Metrics definitions for the stream core.
//!
//! All metrics follow Prometheus naming conventions:
//! - `ap2_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! - `stream_type`: 4 values (realtime, buffered, other, unknown)
//! - `status`: 2 values (success, error)
//! - `reason`: bounded by `StreamError::reason` (7 values)
//! - `kind`: 2 values (sample_delay, anchor)
//! - `outcome`: 2 values (acquired, timeout)

use metrics::{counter, histogram};
use std::time::Duration;

/// Which timing poll a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    SampleDelay,
    Anchor,
}

impl PollKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            PollKind::SampleDelay => "sample_delay",
            PollKind::Anchor => "anchor",
        }
    }
}

/// Record a stream construction attempt.
///
/// Metric: `ap2_stream_setup_total`
/// Labels: `stream_type`, `status`
pub fn record_setup(stream_type: &'static str, status: &'static str) {
    counter!(
        "ap2_stream_setup_total",
        "stream_type" => stream_type,
        "status" => status
    )
    .increment(1);
}

/// Record why construction failed.
///
/// Metric: `ap2_stream_setup_failures_total`
/// Labels: `reason`
pub fn record_setup_failure(reason: &'static str) {
    counter!("ap2_stream_setup_failures_total", "reason" => reason).increment(1);
}

/// Record one timing poll and how long it waited.
///
/// Metrics: `ap2_timing_poll_total`, `ap2_timing_poll_duration_seconds`
/// Labels: `kind`, `outcome` (counter only)
pub fn record_timing_poll(kind: PollKind, acquired: bool, waited: Duration) {
    let outcome = if acquired { "acquired" } else { "timeout" };

    counter!(
        "ap2_timing_poll_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!("ap2_timing_poll_duration_seconds", "kind" => kind.as_str())
        .record(waited.as_secs_f64());
}

/// Record a teardown that stopped workers.
///
/// Metric: `ap2_stream_teardown_total`
/// Labels: `status`
pub fn record_teardown(status: &'static str) {
    counter!("ap2_stream_teardown_total", "status" => status).increment(1);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_poll_kind_labels() {
        assert_eq!(PollKind::SampleDelay.as_str(), "sample_delay");
        assert_eq!(PollKind::Anchor.as_str(), "anchor");
    }

    #[test]
    fn test_metrics_without_recorder_do_not_panic() {
        record_setup("realtime", "success");
        record_setup_failure("spawn");
        record_timing_poll(PollKind::Anchor, false, Duration::from_millis(500));
        record_teardown("success");
    }

    #[test]
    fn test_recorded_metric_names() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_setup("realtime", "success");
            record_setup("buffered", "error");
            record_setup_failure("malformed_description");
            record_timing_poll(PollKind::SampleDelay, true, Duration::from_millis(20));
            record_timing_poll(PollKind::Anchor, false, Duration::from_millis(500));
            record_teardown("success");
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let counter_value = |name: &str| -> u64 {
            snapshot
                .iter()
                .filter(|(key, _, _, _)| key.key().name() == name)
                .map(|(_, _, _, value)| match value {
                    DebugValue::Counter(count) => *count,
                    _ => 0,
                })
                .sum()
        };

        assert_eq!(counter_value("ap2_stream_setup_total"), 2);
        assert_eq!(counter_value("ap2_stream_setup_failures_total"), 1);
        assert_eq!(counter_value("ap2_timing_poll_total"), 2);
        assert_eq!(counter_value("ap2_stream_teardown_total"), 1);
        assert!(snapshot
            .iter()
            .any(|(key, _, _, _)| key.key().name() == "ap2_timing_poll_duration_seconds"));
    }
}

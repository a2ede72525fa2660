//! Playback timing facts reported by the audio worker.
//!
//! The audio worker knows the real output latency and the RTP position it
//! aligned playback to; the stream core cannot compute either. Both arrive
//! as pushed events and are folded into [`TimingState`].

use std::fmt;

/// Synchronization anchor: a sender-clock RTP timestamp paired with the
/// receiver's monotonic clock at the moment that sample plays.
///
/// The RTP value is reported to the sender as-is. The audio worker may
/// deliberately offset it from the true hardware position to steer the
/// sender's sync behaviour; it is not validated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Sender clock domain.
    pub rtp_time: u64,
    /// Receiver monotonic clock, nanoseconds.
    pub local_monotonic_nanos: u64,
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rtp={} local={}ns", self.rtp_time, self.local_monotonic_nanos)
    }
}

/// Timing state of one stream.
///
/// The anchor is a single value so its two halves are always set together.
/// A recorded sample delay is never cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimingState {
    anchor: Option<Anchor>,
    sample_delay: Option<f64>,
}

impl TimingState {
    #[must_use]
    pub fn anchor(&self) -> Option<Anchor> {
        self.anchor
    }

    /// Measured output latency in seconds.
    #[must_use]
    pub fn sample_delay(&self) -> Option<f64> {
        self.sample_delay
    }

    /// Output latency in whole microseconds, as reported in `audioLatency`.
    #[must_use]
    // Delays are validated non-negative and finite when recorded.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn audio_latency_micros(&self) -> Option<u64> {
        self.sample_delay
            .map(|seconds| (seconds * 1_000_000.0).round() as u64)
    }

    pub fn record_anchor(&mut self, anchor: Anchor) {
        self.anchor = Some(anchor);
    }

    /// Store a delay, replacing any earlier one. Returns false (and keeps the
    /// previous value) when `seconds` is negative or not finite.
    pub fn record_sample_delay(&mut self, seconds: f64) -> bool {
        if !is_valid_delay(seconds) {
            return false;
        }
        self.sample_delay = Some(seconds);
        true
    }

    /// Store a delay only if none has been recorded yet.
    pub fn record_sample_delay_if_unset(&mut self, seconds: f64) -> bool {
        if self.sample_delay.is_some() {
            return false;
        }
        self.record_sample_delay(seconds)
    }
}

/// Whether `seconds` is an acceptable sample delay (finite, non-negative).
pub(crate) fn is_valid_delay(seconds: f64) -> bool {
    seconds.is_finite() && seconds >= 0.0
}

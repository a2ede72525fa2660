//! Jitter-buffer sizing from sender-supplied parameters.
//!
//! Both formulas add one frame after truncating division, so the result is
//! at least 1 for any input. Arithmetic is done in `u64` and saturated into
//! `u32` frames.

use crate::errors::StreamError;

/// Realtime capacity: `latency_min * multiplier / spf + 1`.
///
/// With the default multiplier of 4, `latencyMin = 11025` at 352 samples per
/// frame gives 126 frames, about one second of audio at 44.1 kHz.
pub fn realtime_buffer_frames(
    latency_min: u64,
    samples_per_frame: u64,
    multiplier: u32,
) -> Result<u32, StreamError> {
    if latency_min == 0 || samples_per_frame == 0 {
        return Err(StreamError::InvalidLatencyParameters {
            latency_min: i128::from(latency_min),
            samples_per_frame: i128::from(samples_per_frame),
        });
    }

    let frames = latency_min.saturating_mul(u64::from(multiplier)) / samples_per_frame;
    Ok(saturate_frames(frames))
}

/// Buffered capacity: `requested_size / spf + 1`.
pub fn buffered_buffer_frames(
    requested_size: u64,
    samples_per_frame: u64,
) -> Result<u32, StreamError> {
    let frames = requested_size
        .checked_div(samples_per_frame)
        .ok_or_else(|| StreamError::MalformedStreamDescription("'spf' must be positive".into()))?;
    Ok(saturate_frames(frames))
}

fn saturate_frames(frames: u64) -> u32 {
    u32::try_from(frames.saturating_add(1)).unwrap_or(u32::MAX)
}

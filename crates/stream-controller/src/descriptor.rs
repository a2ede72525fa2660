//! Stream descriptor returned to the sender in the SETUP response.
//!
//! A [`Descriptor`] is a snapshot: it is assembled from the stream's fixed
//! fields plus whatever timing facts are known at that moment, and does not
//! change afterwards.

use common::types::StreamId;
use serde::Serialize;

use crate::description::StreamType;
use crate::errors::StreamError;
use crate::subconn::SubConnectionSet;
use crate::timing::TimingState;

/// Fields fixed at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseFields {
    pub stream_type: StreamType,
    /// 0 when no control endpoint was allocated.
    pub control_port: u16,
    /// 0 when no data endpoint was allocated.
    pub data_port: u16,
    /// Buffer size as requested by the session layer, not the derived capacity.
    pub audio_buffer_size: u64,
    pub stream_id: StreamId,
}

/// Protocol-facing description of a negotiated stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Descriptor {
    #[serde(rename = "type")]
    stream_type: u64,
    #[serde(rename = "controlPort")]
    control_port: u16,
    #[serde(rename = "dataPort")]
    data_port: u16,
    #[serde(rename = "audioBufferSize")]
    audio_buffer_size: u64,
    #[serde(rename = "streamID")]
    stream_id: StreamId,
    /// Microseconds.
    #[serde(rename = "audioLatency", skip_serializing_if = "Option::is_none")]
    audio_latency: Option<u64>,
    #[serde(rename = "rtpTime", skip_serializing_if = "Option::is_none")]
    rtp_time: Option<u64>,
    #[serde(rename = "streamConnections", skip_serializing_if = "Option::is_none")]
    stream_connections: Option<SubConnectionSet>,
}

impl Descriptor {
    /// Build a descriptor from the fixed fields and the current timing state.
    ///
    /// `audioLatency` appears once a sample delay is known, `rtpTime` once an
    /// anchor is known. The anchor's RTP time is passed through unchecked.
    #[must_use]
    pub fn assemble(
        base: &BaseFields,
        timing: &TimingState,
        sub_connections: Option<&SubConnectionSet>,
    ) -> Self {
        Self {
            stream_type: base.stream_type.wire_value(),
            control_port: base.control_port,
            data_port: base.data_port,
            audio_buffer_size: base.audio_buffer_size,
            stream_id: base.stream_id,
            audio_latency: timing.audio_latency_micros(),
            rtp_time: timing.anchor().map(|anchor| anchor.rtp_time),
            stream_connections: sub_connections.cloned(),
        }
    }

    #[must_use]
    pub fn stream_type(&self) -> u64 {
        self.stream_type
    }

    #[must_use]
    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    #[must_use]
    pub fn data_port(&self) -> u16 {
        self.data_port
    }

    #[must_use]
    pub fn audio_buffer_size(&self) -> u64 {
        self.audio_buffer_size
    }

    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    #[must_use]
    pub fn audio_latency(&self) -> Option<u64> {
        self.audio_latency
    }

    #[must_use]
    pub fn rtp_time(&self) -> Option<u64> {
        self.rtp_time
    }

    #[must_use]
    pub fn stream_connections(&self) -> Option<&SubConnectionSet> {
        self.stream_connections.as_ref()
    }

    /// Encode as a binary property list.
    pub fn to_binary_plist(&self) -> Result<Vec<u8>, StreamError> {
        let mut bytes = Vec::new();
        plist::to_writer_binary(&mut bytes, self)
            .map_err(|e| StreamError::Codec(format!("descriptor: {e}")))?;
        Ok(bytes)
    }
}

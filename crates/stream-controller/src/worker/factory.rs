//! Worker factory seams.
//!
//! The control worker (feedback/retransmit handling) and the audio worker
//! (decrypt, decode, output) live outside this crate. The stream core only
//! starts them through these traits and talks to them through the channels
//! they return.

use common::secret::KeyMaterial;
use std::fmt;
use std::net::SocketAddr;

use super::handle::WorkerHandle;
use super::messages::{AudioChannel, AudioControlLink, ControlChannels};
use crate::description::{CompressionType, StreamType};
use crate::endpoint::Endpoint;
use crate::errors::SpawnError;

/// Starts control workers.
pub trait ControlWorkerFactory: Send + Sync + fmt::Debug {
    /// Start a control worker that owns `control` and sends feedback about
    /// the data endpoint at `data_addr`.
    fn spawn(
        &self,
        control: Endpoint,
        data_addr: SocketAddr,
        debug: bool,
    ) -> Result<(WorkerHandle, ControlChannels), SpawnError>;
}

/// Everything an audio worker needs to receive and play one stream.
#[derive(Debug)]
pub struct AudioWorkerParams {
    /// Data endpoint; the worker owns it from here on.
    pub data: Endpoint,
    pub session_key: KeyMaterial,
    /// Present for realtime streams only; buffered packets carry their own nonce.
    pub session_iv: Option<KeyMaterial>,
    pub audio_format: u64,
    pub compression: CompressionType,
    /// Jitter-buffer capacity in frames.
    pub buffer_frames: u32,
    pub samples_per_frame: u32,
    pub stream_type: StreamType,
    pub control: AudioControlLink,
    pub debug: bool,
}

/// Starts audio workers of one variant (realtime or buffered).
pub trait AudioWorkerFactory: Send + Sync + fmt::Debug {
    fn spawn(&self, params: AudioWorkerParams) -> Result<(WorkerHandle, AudioChannel), SpawnError>;
}

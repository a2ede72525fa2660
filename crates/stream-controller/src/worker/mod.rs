//! Worker supervision and messaging.
//!
//! - [`handle`] - `WorkerHandle` for cancelling and joining a worker task
//! - [`messages`] - events, commands and channel sets exchanged with workers
//! - [`factory`] - factory traits the stream uses to start workers

pub mod factory;
pub mod handle;
pub mod messages;

pub use factory::{AudioWorkerFactory, AudioWorkerParams, ControlWorkerFactory};
pub use handle::{WorkerHandle, WorkerKind};
pub use messages::{
    audio_channel, control_channels, AudioChannel, AudioCommand, AudioControlLink, AudioEvent,
    AudioEventParseError, AudioWorkerSide, ControlChannels, ControlEvent, ControlRequest,
    ControlWorkerSide, AUDIO_CHANNEL_BUFFER, CONTROL_CHANNEL_BUFFER,
};

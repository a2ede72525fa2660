//! Stream Controller
//!
//! Per-stream negotiation and synchronization core of an AirPlay 2 audio
//! receiver. For each stream requested in a SETUP it:
//!
//! - validates the sender's stream description,
//! - binds the control and data endpoints,
//! - starts the control worker and the audio worker,
//! - sizes the jitter buffer from the sender's latency bounds,
//! - collects the output latency and playback anchor reported by the audio
//!   worker, and
//! - builds the descriptor returned to the sender.
//!
//! # Architecture
//!
//! ```text
//!  session layer ──▶ Stream ──spawn──▶ control worker (control endpoint)
//!                      │   └─spawn──▶ audio worker   (data endpoint)
//!                      │                  │
//!                      ◀── AudioEvent ────┘
//! ```
//!
//! Workers are tokio tasks behind [`worker::WorkerHandle`]; the stream only
//! talks to them over channels. All collaborators are injected through
//! [`stream::StreamComponents`].

pub mod config;
pub mod description;
pub mod descriptor;
pub mod endpoint;
pub mod errors;
pub mod observability;
pub mod sizing;
pub mod stream;
pub mod subconn;
pub mod timing;
pub mod worker;

pub use config::Config;
pub use description::{StreamDescription, StreamType};
pub use descriptor::Descriptor;
pub use errors::StreamError;
pub use stream::{Stream, StreamComponents, StreamRequest, TimingTimeouts};

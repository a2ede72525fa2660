//! Message types exchanged with the workers.
//!
//! All communication with workers goes through `tokio::sync` channels; the
//! stream core shares no mutable state with them.
//!
//! ```text
//!            AudioCommand                ControlRequest
//!  Stream ───────────────▶ AudioWorker ─────────────────▶ ControlWorker
//!         ◀───────────────             ◀─────────────────
//!            AudioEvent                  ControlEvent (broadcast)
//! ```

use bytes::Bytes;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;

use crate::errors::StreamError;
use crate::timing::Anchor;

/// Default capacity of the audio event/command channels.
pub const AUDIO_CHANNEL_BUFFER: usize = 32;

/// Default capacity of the control request channel and event broadcast.
pub const CONTROL_CHANNEL_BUFFER: usize = 256;

/// Timing report pushed by the audio worker.
///
/// Workers that speak the text framing send `sample_delay-<seconds>` and
/// `anchor-<rtp>-<nanos>`; [`AudioEvent`] parses from and formats to that form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AudioEvent {
    /// Output latency measured once playback started, in seconds.
    SampleDelay { seconds: f64 },
    /// Playback anchor, sent right after a flush or play.
    Anchor(Anchor),
}

/// A text message that is not a known audio event.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised audio worker message '{0}'")]
pub struct AudioEventParseError(pub String);

impl FromStr for AudioEvent {
    type Err = AudioEventParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || AudioEventParseError(s.to_string());

        match s.split_once('-') {
            Some(("sample_delay", value)) => value
                .parse()
                .map(|seconds| AudioEvent::SampleDelay { seconds })
                .map_err(|_| malformed()),
            Some(("anchor", rest)) => {
                let (rtp, nanos) = rest.split_once('-').ok_or_else(malformed)?;
                Ok(AudioEvent::Anchor(Anchor {
                    rtp_time: rtp.parse().map_err(|_| malformed())?,
                    local_monotonic_nanos: nanos.parse().map_err(|_| malformed())?,
                }))
            }
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for AudioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioEvent::SampleDelay { seconds } => write!(f, "sample_delay-{seconds}"),
            AudioEvent::Anchor(anchor) => write!(
                f,
                "anchor-{}-{}",
                anchor.rtp_time, anchor.local_monotonic_nanos
            ),
        }
    }
}

/// Playback commands the session layer sends to the audio worker.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    /// Start (or resume) playback.
    Play,
    /// Stop output, keep buffered audio.
    Pause,
    /// Drop buffered audio up to and including `until_seq`/`until_rtp`.
    /// The worker answers with a fresh anchor.
    Flush { until_seq: u32, until_rtp: u64 },
    /// Output volume in dB (-144 mutes).
    SetVolume { db: f32 },
}

/// Requests from the audio worker to the control worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    /// Ask the sender to retransmit `count` packets starting at `first_seq`.
    Resend { first_seq: u16, count: u16 },
}

/// Events the control worker broadcasts to its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// A packet that arrived on the control endpoint as a retransmission.
    RetransmittedPacket { seq: u16, packet: Bytes },
    /// Sender time announcement.
    TimeSync {
        rtp_time: u64,
        network_time_nanos: u64,
    },
}

/// Channel set exposed by the control worker.
///
/// The stream keeps this for the lifetime of the stream and drops it during
/// teardown; each audio worker gets its own [`AudioControlLink`].
#[derive(Debug)]
pub struct ControlChannels {
    requests: mpsc::Sender<ControlRequest>,
    events: broadcast::Sender<ControlEvent>,
}

impl ControlChannels {
    #[must_use]
    pub fn new(
        requests: mpsc::Sender<ControlRequest>,
        events: broadcast::Sender<ControlEvent>,
    ) -> Self {
        Self { requests, events }
    }

    /// A new link for an audio worker.
    #[must_use]
    pub fn link(&self) -> AudioControlLink {
        AudioControlLink {
            requests: self.requests.clone(),
            events: self.events.subscribe(),
        }
    }
}

/// Audio worker's end of the control channels.
#[derive(Debug)]
pub struct AudioControlLink {
    pub requests: mpsc::Sender<ControlRequest>,
    pub events: broadcast::Receiver<ControlEvent>,
}

/// Control worker's end of the control channels.
#[derive(Debug)]
pub struct ControlWorkerSide {
    pub requests: mpsc::Receiver<ControlRequest>,
    pub events: broadcast::Sender<ControlEvent>,
}

/// Create a connected control channel set.
#[must_use]
pub fn control_channels(capacity: usize) -> (ControlChannels, ControlWorkerSide) {
    let (request_tx, request_rx) = mpsc::channel(capacity);
    let (event_tx, _) = broadcast::channel(capacity);

    (
        ControlChannels::new(request_tx, event_tx.clone()),
        ControlWorkerSide {
            requests: request_rx,
            events: event_tx,
        },
    )
}

/// Stream's end of the duplex audio channel.
#[derive(Debug)]
pub struct AudioChannel {
    events: mpsc::Receiver<AudioEvent>,
    commands: mpsc::Sender<AudioCommand>,
}

impl AudioChannel {
    #[must_use]
    pub fn new(events: mpsc::Receiver<AudioEvent>, commands: mpsc::Sender<AudioCommand>) -> Self {
        Self { events, commands }
    }

    /// Wait for the next event until `deadline`.
    ///
    /// `Ok(None)` means the deadline passed; `Err` means the worker side
    /// is gone and nothing more will arrive.
    pub(crate) async fn recv_until(
        &mut self,
        deadline: Instant,
    ) -> Result<Option<AudioEvent>, ChannelClosed> {
        match tokio::time::timeout_at(deadline, self.events.recv()).await {
            Ok(Some(event)) => Ok(Some(event)),
            Ok(None) => Err(ChannelClosed),
            Err(_elapsed) => Ok(None),
        }
    }

    pub(crate) async fn send(&self, command: AudioCommand) -> Result<(), StreamError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| StreamError::WorkerUnavailable)
    }
}

/// The worker end of an audio channel has been dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ChannelClosed;

/// Audio worker's end of the duplex audio channel.
#[derive(Debug)]
pub struct AudioWorkerSide {
    pub events: mpsc::Sender<AudioEvent>,
    pub commands: mpsc::Receiver<AudioCommand>,
}

/// Create a connected audio channel pair.
#[must_use]
pub fn audio_channel(capacity: usize) -> (AudioChannel, AudioWorkerSide) {
    let (event_tx, event_rx) = mpsc::channel(capacity);
    let (command_tx, command_rx) = mpsc::channel(capacity);

    (
        AudioChannel::new(event_rx, command_tx),
        AudioWorkerSide {
            events: event_tx,
            commands: command_rx,
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_sample_delay() {
        let event: AudioEvent = "sample_delay-0.123".parse().unwrap();
        assert_eq!(event, AudioEvent::SampleDelay { seconds: 0.123 });
    }

    #[test]
    fn test_parse_anchor() {
        let event: AudioEvent = "anchor-3462182400-98123456789".parse().unwrap();
        assert_eq!(
            event,
            AudioEvent::Anchor(Anchor {
                rtp_time: 3_462_182_400,
                local_monotonic_nanos: 98_123_456_789,
            })
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert!("volume--20".parse::<AudioEvent>().is_err());
        assert!("anchor-12".parse::<AudioEvent>().is_err());
        assert!("anchor-x-12".parse::<AudioEvent>().is_err());
        assert!("sample_delay-soon".parse::<AudioEvent>().is_err());
        assert!("sample_delay".parse::<AudioEvent>().is_err());
    }

    #[test]
    fn test_text_form_round_trips() {
        for text in ["sample_delay-0.25", "anchor-1-2"] {
            let event: AudioEvent = text.parse().unwrap();
            assert_eq!(event.to_string(), text);
        }
    }

    #[tokio::test]
    async fn test_recv_until_returns_event() {
        let (mut channel, worker) = audio_channel(AUDIO_CHANNEL_BUFFER);
        worker
            .events
            .send(AudioEvent::SampleDelay { seconds: 0.5 })
            .await
            .unwrap();

        let deadline = Instant::now() + Duration::from_millis(100);
        let event = channel.recv_until(deadline).await.unwrap();
        assert_eq!(event, Some(AudioEvent::SampleDelay { seconds: 0.5 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recv_until_times_out() {
        let (mut channel, _worker) = audio_channel(AUDIO_CHANNEL_BUFFER);

        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(channel.recv_until(deadline).await, Ok(None));
    }

    #[tokio::test]
    async fn test_recv_until_reports_closed_channel() {
        let (mut channel, worker) = audio_channel(AUDIO_CHANNEL_BUFFER);
        drop(worker);

        let deadline = Instant::now() + Duration::from_secs(10);
        assert_eq!(channel.recv_until(deadline).await, Err(ChannelClosed));
    }

    #[tokio::test]
    async fn test_send_after_worker_gone() {
        let (channel, worker) = audio_channel(AUDIO_CHANNEL_BUFFER);
        drop(worker);

        let result = channel.send(AudioCommand::Play).await;
        assert!(matches!(result, Err(StreamError::WorkerUnavailable)));
    }

    #[tokio::test]
    async fn test_control_link_sees_broadcast_events() {
        let (channels, worker) = control_channels(CONTROL_CHANNEL_BUFFER);
        let mut link = channels.link();

        worker
            .events
            .send(ControlEvent::TimeSync {
                rtp_time: 44100,
                network_time_nanos: 1_000,
            })
            .unwrap();

        let event = link.events.recv().await.unwrap();
        assert!(matches!(event, ControlEvent::TimeSync { rtp_time: 44100, .. }));
    }

    #[tokio::test]
    async fn test_control_requests_reach_worker() {
        let (channels, mut worker) = control_channels(CONTROL_CHANNEL_BUFFER);
        let link = channels.link();

        link.requests
            .send(ControlRequest::Resend {
                first_seq: 10,
                count: 3,
            })
            .await
            .unwrap();

        assert_eq!(
            worker.requests.recv().await,
            Some(ControlRequest::Resend {
                first_seq: 10,
                count: 3
            })
        );
    }
}

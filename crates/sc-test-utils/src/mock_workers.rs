//! Mock control and audio workers.
//!
//! Each spawned worker is a tokio task that holds its endpoint until its
//! cancellation token fires, then bumps the factory's termination counter.
//! Audio workers record every command they receive; tests push timing events
//! with [`MockAudioFactory::send_event`].
//!
//! # Example
//!
//! ```rust,ignore
//! let audio = MockAudioFactory::new();
//! // ... Stream::setup ...
//! audio.send_event(AudioEvent::Anchor(anchor)).await;
//! assert_eq!(audio.probe().spawned(), 1);
//! ```

use common::secret::ExposeSecret;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use stream_controller::description::{CompressionType, StreamType};
use stream_controller::endpoint::{Endpoint, EndpointKind};
use stream_controller::errors::SpawnError;
use stream_controller::worker::{
    audio_channel, control_channels, AudioChannel, AudioCommand, AudioEvent, AudioWorkerFactory,
    AudioWorkerParams, ControlChannels, ControlWorkerFactory, WorkerHandle, WorkerKind,
    AUDIO_CHANNEL_BUFFER, CONTROL_CHANNEL_BUFFER,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Spawn and termination counters shared with the worker tasks.
#[derive(Debug, Default)]
pub struct WorkerProbe {
    spawned: AtomicUsize,
    terminated: AtomicUsize,
}

impl WorkerProbe {
    #[must_use]
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Workers that observed their cancellation token.
    #[must_use]
    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// How a mock worker behaves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Behaviour {
    #[default]
    Healthy,
    /// `spawn` returns an error.
    FailSpawn,
    /// The task panics once cancelled.
    PanicOnCancel,
}

async fn idle_until_cancelled(
    token: CancellationToken,
    probe: Arc<WorkerProbe>,
    behaviour: Behaviour,
) {
    token.cancelled().await;
    probe.terminated.fetch_add(1, Ordering::SeqCst);
    if behaviour == Behaviour::PanicOnCancel {
        panic!("mock worker panicked on cancel");
    }
}

/// Mock control worker factory.
#[derive(Debug, Default)]
pub struct MockControlFactory {
    behaviour: Behaviour,
    probe: Arc<WorkerProbe>,
    data_addrs: Mutex<Vec<SocketAddr>>,
}

impl MockControlFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose `spawn` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            behaviour: Behaviour::FailSpawn,
            ..Self::default()
        }
    }

    /// Factory whose workers panic when asked to stop.
    #[must_use]
    pub fn panicking_on_cancel() -> Self {
        Self {
            behaviour: Behaviour::PanicOnCancel,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn probe(&self) -> &WorkerProbe {
        &self.probe
    }

    /// Data addresses passed to each spawned worker.
    #[must_use]
    pub fn data_addrs(&self) -> Vec<SocketAddr> {
        self.data_addrs.lock().unwrap().clone()
    }
}

impl ControlWorkerFactory for MockControlFactory {
    fn spawn(
        &self,
        control: Endpoint,
        data_addr: SocketAddr,
        _debug: bool,
    ) -> Result<(WorkerHandle, ControlChannels), SpawnError> {
        if self.behaviour == Behaviour::FailSpawn {
            return Err(SpawnError::new(WorkerKind::Control, "mock spawn failure"));
        }
        assert_eq!(control.kind(), EndpointKind::Datagram);

        self.probe.spawned.fetch_add(1, Ordering::SeqCst);
        self.data_addrs.lock().unwrap().push(data_addr);

        let (channels, worker_side) = control_channels(CONTROL_CHANNEL_BUFFER);
        let token = CancellationToken::new();
        let probe = self.probe.clone();
        let behaviour = self.behaviour;
        let worker_token = token.clone();

        let handle = WorkerHandle::spawn(WorkerKind::Control, token, async move {
            let _endpoint = control;
            let _worker_side = worker_side;
            idle_until_cancelled(worker_token, probe, behaviour).await;
        });

        Ok((handle, channels))
    }
}

/// What an audio worker was started with. Key bytes are copied out so tests
/// can compare them.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSpawnRecord {
    pub data_port: u16,
    pub data_kind: EndpointKind,
    pub session_key: Vec<u8>,
    pub session_iv: Option<Vec<u8>>,
    pub audio_format: u64,
    pub compression: CompressionType,
    pub buffer_frames: u32,
    pub samples_per_frame: u32,
    pub stream_type: StreamType,
    pub debug: bool,
}

/// Mock audio worker factory.
#[derive(Debug, Default)]
pub struct MockAudioFactory {
    behaviour: Behaviour,
    probe: Arc<WorkerProbe>,
    spawns: Mutex<Vec<AudioSpawnRecord>>,
    commands: Arc<Mutex<Vec<AudioCommand>>>,
    events: Mutex<Option<mpsc::Sender<AudioEvent>>>,
}

impl MockAudioFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory whose `spawn` always fails.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            behaviour: Behaviour::FailSpawn,
            ..Self::default()
        }
    }

    /// Factory whose workers panic when asked to stop.
    #[must_use]
    pub fn panicking_on_cancel() -> Self {
        Self {
            behaviour: Behaviour::PanicOnCancel,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn probe(&self) -> &WorkerProbe {
        &self.probe
    }

    /// Parameters of every spawned worker, in order.
    #[must_use]
    pub fn spawns(&self) -> Vec<AudioSpawnRecord> {
        self.spawns.lock().unwrap().clone()
    }

    /// Parameters of the most recent spawn. Panics if nothing was spawned.
    #[must_use]
    pub fn last_spawn(&self) -> AudioSpawnRecord {
        self.spawns
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no audio worker spawned")
    }

    /// Commands received by the workers, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<AudioCommand> {
        self.commands.lock().unwrap().clone()
    }

    /// Push an event as the most recently spawned worker.
    pub async fn send_event(&self, event: AudioEvent) {
        let sender = self
            .events
            .lock()
            .unwrap()
            .clone()
            .expect("no audio worker event channel");
        sender
            .send(event)
            .await
            .expect("stream dropped its audio channel");
    }

    /// Drop the worker's event sender, as a crashed worker would.
    pub fn close_events(&self) {
        self.events.lock().unwrap().take();
    }
}

impl AudioWorkerFactory for MockAudioFactory {
    fn spawn(&self, params: AudioWorkerParams) -> Result<(WorkerHandle, AudioChannel), SpawnError> {
        let kind = match params.stream_type {
            StreamType::Buffered => WorkerKind::BufferedAudio,
            _ => WorkerKind::RealtimeAudio,
        };
        if self.behaviour == Behaviour::FailSpawn {
            return Err(SpawnError::new(kind, "mock spawn failure"));
        }

        self.probe.spawned.fetch_add(1, Ordering::SeqCst);
        self.spawns.lock().unwrap().push(AudioSpawnRecord {
            data_port: params.data.local_port(),
            data_kind: params.data.kind(),
            session_key: params.session_key.expose_secret().to_vec(),
            session_iv: params
                .session_iv
                .as_ref()
                .map(|iv| iv.expose_secret().to_vec()),
            audio_format: params.audio_format,
            compression: params.compression,
            buffer_frames: params.buffer_frames,
            samples_per_frame: params.samples_per_frame,
            stream_type: params.stream_type,
            debug: params.debug,
        });

        let (channel, worker_side) = audio_channel(AUDIO_CHANNEL_BUFFER);
        *self.events.lock().unwrap() = Some(worker_side.events);

        let token = CancellationToken::new();
        let worker_token = token.clone();
        let probe = self.probe.clone();
        let behaviour = self.behaviour;
        let commands = self.commands.clone();
        let mut command_rx = worker_side.commands;
        let data = params.data;
        let control = params.control;

        let handle = WorkerHandle::spawn(kind, token, async move {
            let _endpoint = data;
            let _control = control;
            loop {
                tokio::select! {
                    () = worker_token.cancelled() => break,
                    command = command_rx.recv() => match command {
                        Some(command) => commands.lock().unwrap().push(command),
                        None => break,
                    },
                }
            }
            idle_until_cancelled(worker_token, probe, behaviour).await;
        });

        Ok((handle, channel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stream_controller::endpoint::{EndpointAllocator, SocketAllocator};

    fn endpoint(kind: EndpointKind) -> Endpoint {
        SocketAllocator
            .allocate("127.0.0.1:0".parse().unwrap(), kind)
            .unwrap()
    }

    #[tokio::test]
    async fn test_control_worker_counts_spawn_and_termination() {
        let factory = MockControlFactory::new();
        let data = endpoint(EndpointKind::Datagram);

        let (handle, _channels) = factory
            .spawn(endpoint(EndpointKind::Datagram), data.local_addr(), false)
            .unwrap();
        assert_eq!(factory.probe().spawned(), 1);
        assert_eq!(factory.data_addrs(), vec![data.local_addr()]);

        handle.terminate().await.unwrap();
        assert_eq!(factory.probe().terminated(), 1);
    }

    #[tokio::test]
    async fn test_failing_factory() {
        let factory = MockControlFactory::failing();
        let data = endpoint(EndpointKind::Datagram);

        let err = factory
            .spawn(endpoint(EndpointKind::Datagram), data.local_addr(), false)
            .unwrap_err();
        assert_eq!(err.worker, WorkerKind::Control);
        assert_eq!(factory.probe().spawned(), 0);
    }

    #[tokio::test]
    async fn test_panicking_worker_reports_exit_error() {
        let factory = MockControlFactory::panicking_on_cancel();
        let data = endpoint(EndpointKind::Datagram);

        let (handle, _channels) = factory
            .spawn(endpoint(EndpointKind::Datagram), data.local_addr(), false)
            .unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle.terminate())
            .await
            .unwrap()
            .unwrap_err();
        assert_eq!(factory.probe().terminated(), 1);
    }
}

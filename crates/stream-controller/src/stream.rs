//! The per-stream core.
//!
//! A [`Stream`] is created from one stream entry of a SETUP request. For
//! audio streams it binds a control and a data endpoint, starts the control
//! worker and the audio worker, and then tracks the timing facts the audio
//! worker reports so they can be handed back to the sender in the
//! [`Descriptor`].
//!
//! # Lifecycle
//!
//! 1. [`Stream::setup`] validates the description, allocates endpoints,
//!    negotiates sub-connections and spawns workers. Any failure releases
//!    whatever was acquired and returns a single error.
//! 2. The session layer polls timing with [`Stream::acquire_sample_delay`]
//!    and [`Stream::refresh_anchor`], forwards playback commands with
//!    [`Stream::send_audio_command`] and reads [`Stream::descriptor`].
//! 3. [`Stream::teardown`] stops both workers. It runs once; later calls do
//!    nothing.

use common::secret::{key_material, KeyMaterial};
use common::types::{StreamId, StreamIdSource};
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, field, info, instrument, warn, Span};

use crate::config::Config;
use crate::description::{CompressionType, StreamDescription, StreamType};
use crate::descriptor::{BaseFields, Descriptor};
use crate::endpoint::{EndpointAllocator, EndpointKind, SocketAllocator};
use crate::errors::StreamError;
use crate::observability::metrics::{self, PollKind};
use crate::sizing::{buffered_buffer_frames, realtime_buffer_frames};
use crate::subconn::{LocalPortNegotiator, SubConnectionNegotiator, SubConnectionSet};
use crate::timing::{is_valid_delay, Anchor, TimingState};
use crate::worker::{
    AudioChannel, AudioCommand, AudioEvent, AudioWorkerFactory, AudioWorkerParams,
    ControlChannels, ControlWorkerFactory, WorkerHandle,
};

/// Session key used when neither the description nor the caller supplies
/// one and [`Config::allow_insecure_default_key`] is set.
pub const INSECURE_DEFAULT_SESSION_KEY: [u8; 32] = [0; 32];

/// Collaborators a stream is built with.
///
/// Cheap to clone; one value is normally shared by every stream of a
/// receiver.
#[derive(Debug, Clone)]
pub struct StreamComponents {
    allocator: Arc<dyn EndpointAllocator>,
    control_workers: Arc<dyn ControlWorkerFactory>,
    realtime_audio: Arc<dyn AudioWorkerFactory>,
    buffered_audio: Arc<dyn AudioWorkerFactory>,
    sub_connections: Arc<dyn SubConnectionNegotiator>,
    stream_ids: Arc<dyn StreamIdSource>,
}

impl StreamComponents {
    /// Components with OS sockets, local-port sub-connection answers and
    /// random stream IDs.
    #[must_use]
    pub fn new(
        control_workers: Arc<dyn ControlWorkerFactory>,
        realtime_audio: Arc<dyn AudioWorkerFactory>,
        buffered_audio: Arc<dyn AudioWorkerFactory>,
    ) -> Self {
        Self {
            allocator: Arc::new(SocketAllocator),
            control_workers,
            realtime_audio,
            buffered_audio,
            sub_connections: Arc::new(LocalPortNegotiator),
            stream_ids: Arc::new(common::types::RandomStreamIds::new()),
        }
    }

    #[must_use]
    pub fn with_allocator(mut self, allocator: Arc<dyn EndpointAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    #[must_use]
    pub fn with_sub_connections(mut self, negotiator: Arc<dyn SubConnectionNegotiator>) -> Self {
        self.sub_connections = negotiator;
        self
    }

    #[must_use]
    pub fn with_stream_ids(mut self, stream_ids: Arc<dyn StreamIdSource>) -> Self {
        self.stream_ids = stream_ids;
        self
    }

    fn audio_factory(&self, stream_type: StreamType) -> &dyn AudioWorkerFactory {
        match stream_type {
            StreamType::Buffered => self.buffered_audio.as_ref(),
            _ => self.realtime_audio.as_ref(),
        }
    }
}

/// Inputs for [`Stream::setup`].
#[derive(Debug)]
pub struct StreamRequest {
    description: StreamDescription,
    receiver_addr: IpAddr,
    port_hint: u16,
    buffer_size: u64,
    stream_id: Option<u32>,
    shared_key: Option<KeyMaterial>,
    debug: bool,
}

impl StreamRequest {
    #[must_use]
    pub fn new(description: StreamDescription, receiver_addr: IpAddr) -> Self {
        Self {
            description,
            receiver_addr,
            port_hint: 0,
            buffer_size: 0,
            stream_id: None,
            shared_key: None,
            debug: false,
        }
    }

    /// Port to bind the control endpoint on (0 = any).
    #[must_use]
    pub fn with_port_hint(mut self, port: u16) -> Self {
        self.port_hint = port;
        self
    }

    /// Buffer size the receiver advertises, reported back as `audioBufferSize`.
    #[must_use]
    pub fn with_buffer_size(mut self, bytes: u64) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Reuse a stream ID chosen by the session layer. 0 means none.
    #[must_use]
    pub fn with_stream_id(mut self, stream_id: u32) -> Self {
        self.stream_id = Some(stream_id);
        self
    }

    /// Key negotiated during pairing, used when the description has no `shk`.
    #[must_use]
    pub fn with_shared_key(mut self, key: KeyMaterial) -> Self {
        self.shared_key = Some(key);
        self
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

/// Default poll budgets, see [`Stream::timing_timeouts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimingTimeouts {
    pub sample_delay: Duration,
    pub anchor: Duration,
}

/// Audio parameters validated from the description.
#[derive(Debug, Clone, Copy)]
struct AudioSettings {
    audio_format: u64,
    compression: CompressionType,
    samples_per_frame: u32,
    buffer_frames: u32,
    latency_bounds: Option<(u64, u64)>,
    sender_control_port: Option<u16>,
    insecure_default_key: bool,
}

/// Key material taken from the request; moved into the audio worker.
struct SessionKeys {
    key: KeyMaterial,
    iv: Option<KeyMaterial>,
}

#[derive(Debug)]
struct Workers {
    control: WorkerHandle,
    control_channels: ControlChannels,
    audio: WorkerHandle,
    audio_channel: AudioChannel,
}

/// One negotiated stream.
#[derive(Debug)]
pub struct Stream {
    base: BaseFields,
    audio: Option<AudioSettings>,
    stream_connection_id: Option<u64>,
    supports_dynamic_stream_id: bool,
    sub_connections: Option<SubConnectionSet>,
    timing: TimingState,
    timeouts: TimingTimeouts,
    workers: Option<Workers>,
    initialized: bool,
    culled: bool,
}

impl Stream {
    /// Validate `request`, allocate endpoints and start the workers.
    ///
    /// # Errors
    ///
    /// - `MalformedStreamDescription` for missing or mistyped fields,
    ///   including a missing session key when the insecure default is off.
    /// - `InvalidLatencyParameters` for a realtime stream with a zero or
    ///   negative `latencyMin` or `spf`.
    /// - `EndpointAllocationFailed` when a socket cannot be bound.
    /// - `Spawn` when a worker fails to start.
    ///
    /// Nothing acquired before the failure outlives the call.
    #[instrument(
        skip_all,
        name = "ap2.stream.setup",
        fields(stream_type = field::Empty, stream_id = field::Empty)
    )]
    pub async fn setup(
        request: StreamRequest,
        components: &StreamComponents,
        config: &Config,
    ) -> Result<Self, StreamError> {
        let type_label = request
            .description
            .stream_type()
            .map_or("unknown", StreamType::as_str);

        match Self::build(request, components, config).await {
            Ok(stream) => {
                metrics::record_setup(type_label, "success");
                info!(
                    target: "ap2.stream",
                    stream_id = %stream.stream_id(),
                    stream_type = stream.stream_type().as_str(),
                    control_port = stream.control_port(),
                    data_port = stream.data_port(),
                    buffer_frames = ?stream.buffer_frames(),
                    compression = stream.compression().map_or("none", CompressionType::as_str),
                    "{}",
                    stream.summary()
                );
                Ok(stream)
            }
            Err(e) => {
                metrics::record_setup(type_label, "error");
                metrics::record_setup_failure(e.reason());
                warn!(
                    target: "ap2.stream",
                    stream_type = type_label,
                    error = %e,
                    "Stream setup failed"
                );
                Err(e)
            }
        }
    }

    async fn build(
        request: StreamRequest,
        components: &StreamComponents,
        config: &Config,
    ) -> Result<Self, StreamError> {
        let StreamRequest {
            description,
            receiver_addr,
            port_hint,
            buffer_size,
            stream_id,
            shared_key,
            debug,
        } = request;

        let stream_type = description.stream_type()?;
        let stream_connection_id = description.unsigned("streamConnectionID")?;
        let supports_dynamic_stream_id = description
            .boolean("supportsDynamicStreamID")?
            .unwrap_or(false);

        let stream_id = stream_id
            .filter(|id| *id != 0)
            .map_or_else(|| components.stream_ids.next_id(), StreamId);

        let span = Span::current();
        span.record("stream_type", stream_type.as_str());
        span.record("stream_id", stream_id.get());

        let timeouts = TimingTimeouts {
            sample_delay: config.sample_delay_timeout,
            anchor: config.anchor_timeout,
        };

        if !stream_type.is_audio() {
            debug!(
                target: "ap2.stream",
                stream_id = %stream_id,
                stream_type = %stream_type,
                "Stream type carries no audio, no endpoints allocated"
            );
            return Ok(Self {
                base: BaseFields {
                    stream_type,
                    control_port: 0,
                    data_port: 0,
                    audio_buffer_size: buffer_size,
                    stream_id,
                },
                audio: None,
                stream_connection_id,
                supports_dynamic_stream_id,
                sub_connections: None,
                timing: TimingState::default(),
                timeouts,
                workers: None,
                initialized: true,
                culled: false,
            });
        }

        // Validate everything before the first allocation.
        let (settings, keys) =
            parse_audio_settings(&description, stream_type, buffer_size, shared_key, config)?;

        let control = components.allocator.allocate(
            SocketAddr::new(receiver_addr, port_hint),
            EndpointKind::Datagram,
        )?;
        let data_kind = match stream_type {
            StreamType::Buffered => EndpointKind::Stream,
            _ => EndpointKind::Datagram,
        };
        let data = components
            .allocator
            .allocate(SocketAddr::new(receiver_addr, 0), data_kind)?;

        let control_port = control.local_port();
        let data_port = data.local_port();
        let data_addr = data.local_addr();

        let sub_connections = description.sub_connections().is_some().then(|| {
            components
                .sub_connections
                .negotiate(&description, control_port, data_port, debug)
        });

        let (control_handle, control_channels) =
            components.control_workers.spawn(control, data_addr, debug)?;

        let params = AudioWorkerParams {
            data,
            session_key: keys.key,
            session_iv: keys.iv,
            audio_format: settings.audio_format,
            compression: settings.compression,
            buffer_frames: settings.buffer_frames,
            samples_per_frame: settings.samples_per_frame,
            stream_type,
            control: control_channels.link(),
            debug,
        };

        let (audio_handle, audio_channel) =
            match components.audio_factory(stream_type).spawn(params) {
                Ok(spawned) => spawned,
                Err(e) => {
                    drop(control_channels);
                    if let Err(exit) = control_handle.terminate().await {
                        warn!(
                            target: "ap2.stream",
                            stream_id = %stream_id,
                            error = %exit,
                            "Control worker did not exit cleanly after audio spawn failure"
                        );
                    }
                    return Err(e.into());
                }
            };

        Ok(Self {
            base: BaseFields {
                stream_type,
                control_port,
                data_port,
                audio_buffer_size: buffer_size,
                stream_id,
            },
            audio: Some(settings),
            stream_connection_id,
            supports_dynamic_stream_id,
            sub_connections,
            timing: TimingState::default(),
            timeouts,
            workers: Some(Workers {
                control: control_handle,
                control_channels,
                audio: audio_handle,
                audio_channel,
            }),
            initialized: true,
            culled: false,
        })
    }

    #[must_use]
    pub fn is_audio_stream(&self) -> bool {
        self.base.stream_type.is_audio()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[must_use]
    pub fn stream_type(&self) -> StreamType {
        self.base.stream_type
    }

    #[must_use]
    pub fn stream_id(&self) -> StreamId {
        self.base.stream_id
    }

    /// Local control port, 0 for non-audio streams.
    #[must_use]
    pub fn control_port(&self) -> u16 {
        self.base.control_port
    }

    /// Local data port, 0 for non-audio streams.
    #[must_use]
    pub fn data_port(&self) -> u16 {
        self.base.data_port
    }

    /// Buffer size as requested by the session layer.
    #[must_use]
    pub fn requested_buffer_size(&self) -> u64 {
        self.base.audio_buffer_size
    }

    /// Derived jitter-buffer capacity in frames.
    #[must_use]
    pub fn buffer_frames(&self) -> Option<u32> {
        self.audio.map(|a| a.buffer_frames)
    }

    #[must_use]
    pub fn samples_per_frame(&self) -> Option<u32> {
        self.audio.map(|a| a.samples_per_frame)
    }

    /// `(latencyMin, latencyMax)` in samples, realtime only.
    #[must_use]
    pub fn latency_bounds(&self) -> Option<(u64, u64)> {
        self.audio.and_then(|a| a.latency_bounds)
    }

    #[must_use]
    pub fn audio_format(&self) -> Option<u64> {
        self.audio.map(|a| a.audio_format)
    }

    #[must_use]
    pub fn compression(&self) -> Option<CompressionType> {
        self.audio.map(|a| a.compression)
    }

    /// Sender's own control port, realtime only.
    #[must_use]
    pub fn sender_control_port(&self) -> Option<u16> {
        self.audio.and_then(|a| a.sender_control_port)
    }

    #[must_use]
    pub fn stream_connection_id(&self) -> Option<u64> {
        self.stream_connection_id
    }

    #[must_use]
    pub fn supports_dynamic_stream_id(&self) -> bool {
        self.supports_dynamic_stream_id
    }

    #[must_use]
    pub fn has_sub_connections(&self) -> bool {
        self.sub_connections.is_some()
    }

    /// Whether the session runs on the all-zero fallback key.
    #[must_use]
    pub fn uses_insecure_default_key(&self) -> bool {
        self.audio.is_some_and(|a| a.insecure_default_key)
    }

    #[must_use]
    pub fn sample_delay(&self) -> Option<f64> {
        self.timing.sample_delay()
    }

    #[must_use]
    pub fn anchor(&self) -> Option<Anchor> {
        self.timing.anchor()
    }

    /// Poll budgets from the configuration this stream was built with.
    #[must_use]
    pub fn timing_timeouts(&self) -> TimingTimeouts {
        self.timeouts
    }

    #[must_use]
    pub fn is_culled(&self) -> bool {
        self.culled
    }

    /// One-line status for logs.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "type {} ({}): streamID={} controlPort={} dataPort={}",
            self.base.stream_type,
            self.base.stream_type.as_str(),
            self.base.stream_id,
            self.base.control_port,
            self.base.data_port
        )
    }

    /// Snapshot of the stream for the sender.
    #[must_use]
    pub fn descriptor(&self) -> Descriptor {
        Descriptor::assemble(&self.base, &self.timing, self.sub_connections.as_ref())
    }

    /// Wait up to `timeout` for the audio worker to report its output latency.
    ///
    /// Anchors that arrive meanwhile are stored too. Returns false on timeout,
    /// when the worker has gone away, and for streams without an audio worker.
    #[instrument(
        skip_all,
        name = "ap2.stream.acquire_sample_delay",
        fields(stream_id = %self.base.stream_id)
    )]
    pub async fn acquire_sample_delay(&mut self, timeout: Duration) -> bool {
        self.poll(PollKind::SampleDelay, timeout).await
    }

    /// Wait up to `timeout` for a fresh anchor, typically right after a flush.
    ///
    /// A sample delay seen meanwhile is stored only if none is known yet.
    #[instrument(
        skip_all,
        name = "ap2.stream.refresh_anchor",
        fields(stream_id = %self.base.stream_id)
    )]
    pub async fn refresh_anchor(&mut self, timeout: Duration) -> bool {
        self.poll(PollKind::Anchor, timeout).await
    }

    async fn poll(&mut self, kind: PollKind, timeout: Duration) -> bool {
        let started = Instant::now();
        let deadline = started + timeout;

        let Self {
            workers,
            timing,
            base,
            ..
        } = self;

        let Some(workers) = workers.as_mut() else {
            debug!(target: "ap2.stream", stream_id = %base.stream_id, "No audio worker to poll");
            return false;
        };

        let acquired = loop {
            match workers.audio_channel.recv_until(deadline).await {
                Ok(Some(event)) => {
                    if apply_event(timing, kind, event, base.stream_id) {
                        break true;
                    }
                }
                Ok(None) => break false,
                Err(_closed) => {
                    debug!(
                        target: "ap2.stream",
                        stream_id = %base.stream_id,
                        "Audio worker channel closed"
                    );
                    break false;
                }
            }
        };

        metrics::record_timing_poll(kind, acquired, started.elapsed());
        acquired
    }

    /// Forward a playback command to the audio worker.
    ///
    /// # Errors
    ///
    /// `WorkerUnavailable` after teardown, for non-audio streams, or when the
    /// worker has exited.
    pub async fn send_audio_command(&self, command: AudioCommand) -> Result<(), StreamError> {
        let workers = self.workers.as_ref().ok_or(StreamError::WorkerUnavailable)?;
        workers.audio_channel.send(command).await
    }

    /// Stop both workers and mark the stream culled.
    ///
    /// Only the first call does any work. Workers that fail to exit cleanly
    /// are reported together in one `Teardown` error; the stream is culled
    /// either way.
    #[instrument(
        skip_all,
        name = "ap2.stream.teardown",
        fields(stream_id = %self.base.stream_id)
    )]
    pub async fn teardown(&mut self) -> Result<(), StreamError> {
        if self.culled {
            debug!(target: "ap2.stream", stream_id = %self.base.stream_id, "Already torn down");
            return Ok(());
        }
        self.culled = true;

        let Some(workers) = self.workers.take() else {
            metrics::record_teardown("success");
            return Ok(());
        };

        let Workers {
            control,
            control_channels,
            audio,
            audio_channel,
        } = workers;

        drop(control_channels);

        let mut failures = Vec::new();
        if let Err(e) = control.terminate().await {
            failures.push(e.to_string());
        }
        if let Err(e) = audio.terminate().await {
            failures.push(e.to_string());
        }

        drop(audio_channel);

        if failures.is_empty() {
            metrics::record_teardown("success");
            info!(target: "ap2.stream", stream_id = %self.base.stream_id, "Stream torn down");
            Ok(())
        } else {
            metrics::record_teardown("error");
            let message = failures.join("; ");
            warn!(
                target: "ap2.stream",
                stream_id = %self.base.stream_id,
                error = %message,
                "Stream torn down with worker errors"
            );
            Err(StreamError::Teardown(message))
        }
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if let Some(workers) = &self.workers {
            warn!(
                target: "ap2.stream",
                stream_id = %self.base.stream_id,
                "Stream dropped without teardown, cancelling workers"
            );
            workers.control.cancel();
            workers.audio.cancel();
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

/// Fold one event into `timing`. Returns true when it satisfies the poll.
fn apply_event(
    timing: &mut TimingState,
    kind: PollKind,
    event: AudioEvent,
    stream_id: StreamId,
) -> bool {
    match event {
        AudioEvent::Anchor(anchor) => {
            timing.record_anchor(anchor);
            debug!(target: "ap2.stream", stream_id = %stream_id, %anchor, "Anchor received");
            kind == PollKind::Anchor
        }
        AudioEvent::SampleDelay { seconds } if !is_valid_delay(seconds) => {
            warn!(
                target: "ap2.stream",
                stream_id = %stream_id,
                seconds,
                "Ignoring invalid sample delay"
            );
            false
        }
        AudioEvent::SampleDelay { seconds } => match kind {
            PollKind::SampleDelay => {
                timing.record_sample_delay(seconds);
                debug!(
                    target: "ap2.stream",
                    stream_id = %stream_id,
                    seconds,
                    "Sample delay received"
                );
                true
            }
            PollKind::Anchor => {
                timing.record_sample_delay_if_unset(seconds);
                false
            }
        },
    }
}

fn parse_audio_settings(
    description: &StreamDescription,
    stream_type: StreamType,
    requested_buffer_size: u64,
    shared_key: Option<KeyMaterial>,
    config: &Config,
) -> Result<(AudioSettings, SessionKeys), StreamError> {
    let audio_format = description.require_unsigned("audioFormat")?;
    let compression = CompressionType::from(description.require_unsigned("ct")?);
    let (spf, realtime_latency_min) = match stream_type {
        StreamType::Buffered => (description.require_unsigned("spf")?, None),
        _ => {
            let (latency_min, spf) = realtime_sizing_inputs(description)?;
            (spf, Some(latency_min))
        }
    };
    let samples_per_frame = u32::try_from(spf).map_err(|_| {
        StreamError::MalformedStreamDescription(format!("'spf' out of range: {spf}"))
    })?;

    let (key, insecure_default_key) = resolve_session_key(description, shared_key, config)?;

    let (buffer_frames, latency_bounds, iv, sender_control_port) = match realtime_latency_min {
        None => (
            buffered_buffer_frames(requested_buffer_size, spf)?,
            None,
            None,
            None,
        ),
        Some(latency_min) => {
            let latency_max = description.require_unsigned("latencyMax")?;
            let iv = key_material(description.require_data("shiv")?);
            let sender_control_port = description
                .unsigned("controlPort")?
                .map(|port| {
                    u16::try_from(port).map_err(|_| {
                        StreamError::MalformedStreamDescription(format!(
                            "'controlPort' out of range: {port}"
                        ))
                    })
                })
                .transpose()?;
            let frames = realtime_buffer_frames(latency_min, spf, config.buffer_multiplier)?;
            (
                frames,
                Some((latency_min, latency_max)),
                Some(iv),
                sender_control_port,
            )
        }
    };

    Ok((
        AudioSettings {
            audio_format,
            compression,
            samples_per_frame,
            buffer_frames,
            latency_bounds,
            sender_control_port,
            insecure_default_key,
        },
        SessionKeys { key, iv },
    ))
}

/// `latencyMin` and `spf` for a realtime stream. Both must be positive; a
/// negative wire value is a latency error rather than a type error.
fn realtime_sizing_inputs(description: &StreamDescription) -> Result<(u64, u64), StreamError> {
    let latency_min = description.require_integer("latencyMin")?;
    let spf = description.require_integer("spf")?;
    match (u64::try_from(latency_min), u64::try_from(spf)) {
        (Ok(min), Ok(frame)) if min > 0 && frame > 0 => Ok((min, frame)),
        _ => Err(StreamError::InvalidLatencyParameters {
            latency_min,
            samples_per_frame: spf,
        }),
    }
}

/// `shk` from the description, then the caller's key, then (opt-in) zeros.
fn resolve_session_key(
    description: &StreamDescription,
    shared_key: Option<KeyMaterial>,
    config: &Config,
) -> Result<(KeyMaterial, bool), StreamError> {
    if let Some(shk) = description.data("shk")? {
        return Ok((key_material(shk), false));
    }
    if let Some(key) = shared_key {
        return Ok((key, false));
    }
    if config.allow_insecure_default_key {
        warn!(
            target: "ap2.stream",
            "No session key supplied, falling back to the insecure all-zero key"
        );
        return Ok((key_material(&INSECURE_DEFAULT_SESSION_KEY), true));
    }
    Err(StreamError::MalformedStreamDescription(
        "missing 'shk' and no shared key".to_string(),
    ))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;
    use plist::{Dictionary, Value};

    fn realtime_description() -> StreamDescription {
        let mut fields = Dictionary::new();
        fields.insert("type".to_string(), Value::from(96_u64));
        fields.insert("audioFormat".to_string(), Value::from(0x40000_u64));
        fields.insert("ct".to_string(), Value::from(2_u64));
        fields.insert("spf".to_string(), Value::from(352_u64));
        fields.insert("latencyMin".to_string(), Value::from(11025_u64));
        fields.insert("latencyMax".to_string(), Value::from(88200_u64));
        fields.insert("shiv".to_string(), Value::Data(vec![1; 16]));
        fields.insert("controlPort".to_string(), Value::from(6001_u64));
        StreamDescription::new(fields)
    }

    fn without(description: &StreamDescription, key: &str) -> StreamDescription {
        let mut fields = description.fields().clone();
        fields.remove(key);
        StreamDescription::new(fields)
    }

    #[test]
    fn test_parse_realtime_settings() {
        let (settings, keys) = parse_audio_settings(
            &realtime_description(),
            StreamType::Realtime,
            0,
            Some(key_material(&[9; 32])),
            &Config::default(),
        )
        .unwrap();

        assert_eq!(settings.buffer_frames, 126);
        assert_eq!(settings.samples_per_frame, 352);
        assert_eq!(settings.compression, CompressionType::Alac);
        assert_eq!(settings.latency_bounds, Some((11025, 88200)));
        assert_eq!(settings.sender_control_port, Some(6001));
        assert!(!settings.insecure_default_key);
        assert_eq!(keys.key.expose_secret(), &[9; 32]);
        assert_eq!(keys.iv.unwrap().expose_secret(), &[1; 16]);
    }

    #[test]
    fn test_realtime_requires_shiv_and_latency() {
        for key in ["shiv", "latencyMin", "latencyMax"] {
            let result = parse_audio_settings(
                &without(&realtime_description(), key),
                StreamType::Realtime,
                0,
                Some(key_material(&[0; 32])),
                &Config::default(),
            );
            assert!(
                matches!(
                    result,
                    Err(StreamError::MalformedStreamDescription(ref m)) if m.contains(key)
                ),
                "expected malformed description for missing {key}"
            );
        }
    }

    #[test]
    fn test_shk_wins_over_shared_key() {
        let mut fields = realtime_description().fields().clone();
        fields.insert("shk".to_string(), Value::Data(vec![7; 32]));
        let description = StreamDescription::new(fields);

        let (key, insecure) = resolve_session_key(
            &description,
            Some(key_material(&[8; 32])),
            &Config::default(),
        )
        .unwrap();
        assert_eq!(key.expose_secret(), &[7; 32]);
        assert!(!insecure);
    }

    #[test]
    fn test_default_key_requires_opt_in() {
        let description = realtime_description();

        let err = resolve_session_key(&description, None, &Config::default()).unwrap_err();
        assert!(matches!(err, StreamError::MalformedStreamDescription(m) if m.contains("shk")));

        let config = Config {
            allow_insecure_default_key: true,
            ..Config::default()
        };
        let (key, insecure) = resolve_session_key(&description, None, &config).unwrap();
        assert_eq!(key.expose_secret(), &INSECURE_DEFAULT_SESSION_KEY);
        assert!(insecure);
    }

    #[test]
    fn test_apply_event_during_anchor_poll_keeps_first_delay() {
        let mut timing = TimingState::default();
        let id = StreamId(1);

        for seconds in [0.1, 0.2] {
            let event = AudioEvent::SampleDelay { seconds };
            assert!(!apply_event(&mut timing, PollKind::Anchor, event, id));
        }
        assert_eq!(timing.sample_delay(), Some(0.1));

        let anchor = Anchor {
            rtp_time: 5,
            local_monotonic_nanos: 6,
        };
        assert!(apply_event(&mut timing, PollKind::Anchor, AudioEvent::Anchor(anchor), id));
        assert_eq!(timing.anchor(), Some(anchor));
    }

    #[test]
    fn test_apply_event_ignores_invalid_delay() {
        let mut timing = TimingState::default();
        assert!(!apply_event(
            &mut timing,
            PollKind::SampleDelay,
            AudioEvent::SampleDelay { seconds: f64::NAN },
            StreamId(1)
        ));
        assert!(timing.sample_delay().is_none());
    }
}

//! # SC Test Utilities
//!
//! Mocks and fixtures for exercising `stream-controller` without real
//! workers.
//!
//! ## Modules
//!
//! - `mock_allocator` - Loopback endpoint allocator that records what it
//!   handed out and can be told to fail
//! - `mock_workers` - Control/audio worker factories backed by idle tokio
//!   tasks, with probes for spawn/termination counts and audio events
//! - `fixtures` - Session description builders
//!
//! ## Usage
//!
//! ```rust,ignore
//! use sc_test_utils::{MockWorld, TestStreamDescription};
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let world = MockWorld::new();
//!     let request = StreamRequest::new(
//!         TestStreamDescription::realtime().build(),
//!         sc_test_utils::LOOPBACK,
//!     );
//!
//!     let mut stream = Stream::setup(request, &world.components(), &Config::default())
//!         .await
//!         .unwrap();
//!     world.realtime_audio.send_event(AudioEvent::SampleDelay { seconds: 0.1 }).await;
//!     assert!(stream.acquire_sample_delay(Duration::from_secs(1)).await);
//! }
//! ```

pub mod fixtures;
pub mod mock_allocator;
pub mod mock_workers;

pub use fixtures::TestStreamDescription;
pub use mock_allocator::MockAllocator;
pub use mock_workers::{AudioSpawnRecord, MockAudioFactory, MockControlFactory, WorkerProbe};

use common::types::MonotonicStreamIds;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use stream_controller::StreamComponents;

/// Receiver address used by the fixtures.
pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Every mock a stream needs, kept together so tests can inspect them.
#[derive(Debug, Clone)]
pub struct MockWorld {
    pub allocator: Arc<MockAllocator>,
    pub control: Arc<MockControlFactory>,
    pub realtime_audio: Arc<MockAudioFactory>,
    pub buffered_audio: Arc<MockAudioFactory>,
}

impl MockWorld {
    /// Healthy mocks: every allocation and spawn succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocator: Arc::new(MockAllocator::new()),
            control: Arc::new(MockControlFactory::new()),
            realtime_audio: Arc::new(MockAudioFactory::new()),
            buffered_audio: Arc::new(MockAudioFactory::new()),
        }
    }

    #[must_use]
    pub fn with_allocator(mut self, allocator: MockAllocator) -> Self {
        self.allocator = Arc::new(allocator);
        self
    }

    #[must_use]
    pub fn with_control(mut self, control: MockControlFactory) -> Self {
        self.control = Arc::new(control);
        self
    }

    #[must_use]
    pub fn with_realtime_audio(mut self, audio: MockAudioFactory) -> Self {
        self.realtime_audio = Arc::new(audio);
        self
    }

    #[must_use]
    pub fn with_buffered_audio(mut self, audio: MockAudioFactory) -> Self {
        self.buffered_audio = Arc::new(audio);
        self
    }

    /// Stream components wired to these mocks, with stream IDs counting
    /// up from 1.
    #[must_use]
    pub fn components(&self) -> StreamComponents {
        StreamComponents::new(
            self.control.clone(),
            self.realtime_audio.clone(),
            self.buffered_audio.clone(),
        )
        .with_allocator(self.allocator.clone())
        .with_stream_ids(Arc::new(MonotonicStreamIds::new()))
    }
}

impl Default for MockWorld {
    fn default() -> Self {
        Self::new()
    }
}

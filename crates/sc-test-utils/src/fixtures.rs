//! Session description fixtures.
//!
//! [`TestStreamDescription`] starts from a complete, valid stream entry and
//! lets a test add, replace or remove single fields.
//!
//! ```rust,ignore
//! let description = TestStreamDescription::realtime()
//!     .with_latency(2000, 88200)
//!     .without("shk")
//!     .build();
//! ```

use plist::{Dictionary, Value};
use stream_controller::description::StreamDescription;

/// ALAC 44.1 kHz / 16 bit / stereo.
pub const ALAC_44100_16_2: u64 = 0x40000;

/// AAC-LC 44.1 kHz / stereo.
pub const AAC_LC_44100_2: u64 = 0x0040_0000;

/// Session key used by the fixtures.
pub const TEST_SESSION_KEY: [u8; 32] = [0x5a; 32];

/// Session IV used by the realtime fixture.
pub const TEST_SESSION_IV: [u8; 16] = [0xa5; 16];

/// Builder for a stream entry of a SETUP request.
#[derive(Debug, Clone)]
pub struct TestStreamDescription {
    fields: Dictionary,
}

impl TestStreamDescription {
    /// Realtime ALAC stream: spf 352, latencyMin 11025, latencyMax 88200.
    #[must_use]
    pub fn realtime() -> Self {
        Self::of_type(96)
            .with_unsigned("audioFormat", ALAC_44100_16_2)
            .with_unsigned("ct", 0x2)
            .with_unsigned("spf", 352)
            .with_latency(11025, 88200)
            .with_data("shk", &TEST_SESSION_KEY)
            .with_data("shiv", &TEST_SESSION_IV)
            .with_unsigned("controlPort", 6001)
    }

    /// Buffered AAC-LC stream: spf 352.
    #[must_use]
    pub fn buffered() -> Self {
        Self::of_type(103)
            .with_unsigned("audioFormat", AAC_LC_44100_2)
            .with_unsigned("ct", 0x4)
            .with_unsigned("spf", 352)
            .with_data("shk", &TEST_SESSION_KEY)
    }

    /// Only a `type` field.
    #[must_use]
    pub fn of_type(stream_type: u64) -> Self {
        Self {
            fields: Dictionary::new(),
        }
        .with_unsigned("type", stream_type)
    }

    #[must_use]
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn with_unsigned(self, key: &str, value: u64) -> Self {
        self.with(key, Value::from(value))
    }

    #[must_use]
    pub fn with_data(self, key: &str, bytes: &[u8]) -> Self {
        self.with(key, Value::Data(bytes.to_vec()))
    }

    #[must_use]
    pub fn with_latency(self, min: u64, max: u64) -> Self {
        self.with_unsigned("latencyMin", min)
            .with_unsigned("latencyMax", max)
    }

    #[must_use]
    pub fn with_spf(self, spf: u64) -> Self {
        self.with_unsigned("spf", spf)
    }

    /// Request sub-connections named `names`, with IDs counting from 1.
    #[must_use]
    pub fn with_stream_connections(self, names: &[&str]) -> Self {
        let mut links = Dictionary::new();
        for (id, name) in (1_u64..).zip(names) {
            let mut link = Dictionary::new();
            link.insert("streamConnectionID".to_string(), Value::from(id));
            links.insert((*name).to_string(), Value::Dictionary(link));
        }
        self.with("streamConnections", Value::Dictionary(links))
    }

    #[must_use]
    pub fn without(mut self, key: &str) -> Self {
        self.fields.remove(key);
        self
    }

    #[must_use]
    pub fn build(self) -> StreamDescription {
        StreamDescription::new(self.fields)
    }

    /// Binary plist encoding, as the sender would put it on the wire.
    #[must_use]
    pub fn to_binary_plist(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        Value::Dictionary(self.fields.clone())
            .to_writer_binary(&mut bytes)
            .unwrap();
        bytes
    }
}

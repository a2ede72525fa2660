//! Session description access for one requested stream.
//!
//! The sender describes each stream in the SETUP body as a property-list
//! dictionary. [`StreamDescription`] wraps that dictionary and exposes typed
//! accessors; a field that is missing or has the wrong plist type is reported
//! as [`StreamError::MalformedStreamDescription`].
//!
//! | Key | Type | Meaning |
//! |-----|------|---------|
//! | `type` | integer | 96 realtime, 103 buffered |
//! | `audioFormat` | integer | sender audio format bit |
//! | `ct` | integer | compression type bitmask |
//! | `spf` | integer | samples per frame |
//! | `shk` | data | session key |
//! | `shiv` | data | session IV (realtime) |
//! | `latencyMin` / `latencyMax` | integer | realtime latency bounds, in samples |
//! | `controlPort` | integer | sender's control port (realtime) |
//! | `streamConnectionID` | integer | 64-bit connection ID |
//! | `supportsDynamicStreamID` | bool | sender can re-announce stream IDs |
//! | `streamConnections` | dict/array | sub-connection request |

use plist::{Dictionary, Value};
use std::fmt;
use std::io::Cursor;

use crate::errors::StreamError;

/// Wire value of a realtime stream.
pub const REALTIME_STREAM_TYPE: u64 = 96;

/// Wire value of a buffered stream.
pub const BUFFERED_STREAM_TYPE: u64 = 103;

/// Kind of stream requested by the sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    /// Low-latency audio over datagrams.
    Realtime,
    /// Reliably delivered audio over a stream socket.
    Buffered,
    /// Any other stream type; no endpoints or workers are set up for it.
    Other(u64),
}

impl StreamType {
    /// Wire value of this type.
    #[must_use]
    pub const fn wire_value(self) -> u64 {
        match self {
            StreamType::Realtime => REALTIME_STREAM_TYPE,
            StreamType::Buffered => BUFFERED_STREAM_TYPE,
            StreamType::Other(value) => value,
        }
    }

    /// Whether this type carries audio (and therefore endpoints and workers).
    #[must_use]
    pub const fn is_audio(self) -> bool {
        matches!(self, StreamType::Realtime | StreamType::Buffered)
    }

    /// Bounded label for metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            StreamType::Realtime => "realtime",
            StreamType::Buffered => "buffered",
            StreamType::Other(_) => "other",
        }
    }
}

impl From<u64> for StreamType {
    fn from(value: u64) -> Self {
        match value {
            REALTIME_STREAM_TYPE => StreamType::Realtime,
            BUFFERED_STREAM_TYPE => StreamType::Buffered,
            other => StreamType::Other(other),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.wire_value())
    }
}

/// Compression type (`ct`). Largely implied by `audioFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionType {
    Pcm,
    Alac,
    AacLc,
    AacEld,
    Unknown(u64),
}

impl From<u64> for CompressionType {
    fn from(value: u64) -> Self {
        match value {
            0x1 => CompressionType::Pcm,
            0x2 => CompressionType::Alac,
            0x4 => CompressionType::AacLc,
            0x8 => CompressionType::AacEld,
            other => CompressionType::Unknown(other),
        }
    }
}

impl CompressionType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CompressionType::Pcm => "pcm",
            CompressionType::Alac => "alac",
            CompressionType::AacLc => "aac-lc",
            CompressionType::AacEld => "aac-eld",
            CompressionType::Unknown(_) => "unknown",
        }
    }
}

/// One stream entry of a SETUP request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDescription {
    fields: Dictionary,
}

impl StreamDescription {
    /// Wrap an already-decoded stream dictionary.
    #[must_use]
    pub fn new(fields: Dictionary) -> Self {
        Self { fields }
    }

    /// Decode a stream dictionary from binary or XML plist bytes.
    pub fn from_plist_bytes(bytes: &[u8]) -> Result<Self, StreamError> {
        let value = Value::from_reader(Cursor::new(bytes))
            .map_err(|e| StreamError::Codec(format!("stream description: {e}")))?;

        match value {
            Value::Dictionary(fields) => Ok(Self { fields }),
            _ => Err(StreamError::MalformedStreamDescription(
                "stream description is not a dictionary".to_string(),
            )),
        }
    }

    /// Raw dictionary.
    #[must_use]
    pub fn fields(&self) -> &Dictionary {
        &self.fields
    }

    /// The `type` field.
    pub fn stream_type(&self) -> Result<StreamType, StreamError> {
        self.require_unsigned("type").map(StreamType::from)
    }

    /// Unsigned integer field, `None` when absent.
    pub fn unsigned(&self, key: &str) -> Result<Option<u64>, StreamError> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_unsigned_integer()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "an unsigned integer")),
        }
    }

    /// Unsigned integer field that must be present.
    pub fn require_unsigned(&self, key: &str) -> Result<u64, StreamError> {
        self.unsigned(key)?.ok_or_else(|| missing(key))
    }

    /// Integer field of either sign, `None` when absent.
    pub fn integer(&self, key: &str) -> Result<Option<i128>, StreamError> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_unsigned_integer()
                .map(i128::from)
                .or_else(|| value.as_signed_integer().map(i128::from))
                .map(Some)
                .ok_or_else(|| wrong_type(key, "an integer")),
        }
    }

    pub fn require_integer(&self, key: &str) -> Result<i128, StreamError> {
        self.integer(key)?.ok_or_else(|| missing(key))
    }

    /// Data field, `None` when absent.
    pub fn data(&self, key: &str) -> Result<Option<&[u8]>, StreamError> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_data()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "data")),
        }
    }

    /// Data field that must be present.
    pub fn require_data(&self, key: &str) -> Result<&[u8], StreamError> {
        self.data(key)?.ok_or_else(|| missing(key))
    }

    /// Boolean field, `None` when absent.
    pub fn boolean(&self, key: &str) -> Result<Option<bool>, StreamError> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_boolean()
                .map(Some)
                .ok_or_else(|| wrong_type(key, "a boolean")),
        }
    }

    /// The `streamConnections` request, if the sender asked for sub-connections.
    #[must_use]
    pub fn sub_connections(&self) -> Option<&Value> {
        self.fields.get("streamConnections")
    }
}

impl From<Dictionary> for StreamDescription {
    fn from(fields: Dictionary) -> Self {
        Self::new(fields)
    }
}

fn missing(key: &str) -> StreamError {
    StreamError::MalformedStreamDescription(format!("missing '{key}'"))
}

fn wrong_type(key: &str, expected: &str) -> StreamError {
    StreamError::MalformedStreamDescription(format!("'{key}' is not {expected}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn description(pairs: Vec<(&str, Value)>) -> StreamDescription {
        let mut dict = Dictionary::new();
        for (key, value) in pairs {
            dict.insert(key.to_string(), value);
        }
        StreamDescription::new(dict)
    }

    #[test]
    fn test_stream_type_from_wire() {
        assert_eq!(StreamType::from(96), StreamType::Realtime);
        assert_eq!(StreamType::from(103), StreamType::Buffered);
        assert_eq!(StreamType::from(130), StreamType::Other(130));
        assert_eq!(StreamType::Other(130).wire_value(), 130);
        assert!(StreamType::Realtime.is_audio());
        assert!(StreamType::Buffered.is_audio());
        assert!(!StreamType::Other(130).is_audio());
    }

    #[test]
    fn test_compression_type_bits() {
        assert_eq!(CompressionType::from(0x1), CompressionType::Pcm);
        assert_eq!(CompressionType::from(0x2), CompressionType::Alac);
        assert_eq!(CompressionType::from(0x4), CompressionType::AacLc);
        assert_eq!(CompressionType::from(0x8), CompressionType::AacEld);
        assert_eq!(CompressionType::from(0x3), CompressionType::Unknown(3));
        assert_eq!(CompressionType::Alac.as_str(), "alac");
        assert_eq!(CompressionType::Unknown(3).as_str(), "unknown");
    }

    #[test]
    fn test_missing_type_is_malformed() {
        let desc = description(vec![("spf", Value::from(352_u64))]);
        let err = desc.stream_type().unwrap_err();
        assert!(
            matches!(err, StreamError::MalformedStreamDescription(msg) if msg.contains("type"))
        );
    }

    #[test]
    fn test_wrong_field_type_is_malformed() {
        let desc = description(vec![("spf", Value::from("352"))]);
        assert!(matches!(
            desc.unsigned("spf"),
            Err(StreamError::MalformedStreamDescription(_))
        ));

        let desc = description(vec![("shk", Value::from(1_u64))]);
        assert!(matches!(
            desc.data("shk"),
            Err(StreamError::MalformedStreamDescription(_))
        ));
    }

    #[test]
    fn test_typed_accessors() {
        let desc = description(vec![
            ("type", Value::from(96_u64)),
            ("shiv", Value::Data(vec![7; 16])),
            ("supportsDynamicStreamID", Value::Boolean(true)),
        ]);

        assert_eq!(desc.stream_type().unwrap(), StreamType::Realtime);
        assert_eq!(desc.require_data("shiv").unwrap(), &[7; 16]);
        assert_eq!(desc.boolean("supportsDynamicStreamID").unwrap(), Some(true));
        assert_eq!(desc.unsigned("latencyMin").unwrap(), None);
        assert!(desc.sub_connections().is_none());
    }

    #[test]
    fn test_integer_accepts_either_sign() {
        let desc = description(vec![
            ("latencyMin", Value::from(-11025_i64)),
            ("spf", Value::from(352_u64)),
            ("latencyMax", Value::from(u64::MAX)),
        ]);

        assert_eq!(desc.require_integer("latencyMin").unwrap(), -11025);
        assert_eq!(desc.require_integer("spf").unwrap(), 352);
        assert_eq!(desc.integer("latencyMax").unwrap(), Some(i128::from(u64::MAX)));
        assert!(desc.unsigned("latencyMin").is_err());
        assert!(matches!(
            desc.require_integer("shk"),
            Err(StreamError::MalformedStreamDescription(msg)) if msg.contains("shk")
        ));
    }

    #[test]
    fn test_from_plist_bytes() {
        let mut dict = Dictionary::new();
        dict.insert("type".to_string(), Value::from(103_u64));
        dict.insert("spf".to_string(), Value::from(352_u64));

        let mut bytes = Vec::new();
        Value::Dictionary(dict).to_writer_binary(&mut bytes).unwrap();

        let desc = StreamDescription::from_plist_bytes(&bytes).unwrap();
        assert_eq!(desc.stream_type().unwrap(), StreamType::Buffered);
        assert_eq!(desc.require_unsigned("spf").unwrap(), 352);
    }

    #[test]
    fn test_from_plist_bytes_rejects_non_dictionary() {
        let mut bytes = Vec::new();
        Value::from(5_u64).to_writer_binary(&mut bytes).unwrap();

        assert!(matches!(
            StreamDescription::from_plist_bytes(&bytes),
            Err(StreamError::MalformedStreamDescription(_))
        ));
    }

    #[test]
    fn test_from_plist_bytes_rejects_garbage() {
        assert!(StreamDescription::from_plist_bytes(&[0x00, 0xff, 0x13]).is_err());
    }
}

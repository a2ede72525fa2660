//! Sub-connection negotiation.
//!
//! Some session topologies request several logical links inside one stream
//! (`streamConnections`). Negotiation runs once the stream's ports are known
//! and its result is embedded in every descriptor.

use plist::{Dictionary, Value};
use serde::Serialize;
use std::fmt;
use tracing::debug;

use crate::description::StreamDescription;

/// Negotiated sub-connection descriptors, in the shape the sender expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SubConnectionSet(Value);

impl SubConnectionSet {
    #[must_use]
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

/// Computes sub-connection descriptors for a stream.
pub trait SubConnectionNegotiator: Send + Sync + fmt::Debug {
    fn negotiate(
        &self,
        description: &StreamDescription,
        control_port: u16,
        data_port: u16,
        debug_session: bool,
    ) -> SubConnectionSet;
}

/// Answers every requested sub-connection with the stream's own ports.
///
/// Keeps the request's shape (dictionary keyed by link name, or array) and
/// echoes each entry's `streamConnectionID`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalPortNegotiator;

impl SubConnectionNegotiator for LocalPortNegotiator {
    fn negotiate(
        &self,
        description: &StreamDescription,
        control_port: u16,
        data_port: u16,
        debug_session: bool,
    ) -> SubConnectionSet {
        let answer = match description.sub_connections() {
            Some(Value::Dictionary(requested)) => {
                let mut links = Dictionary::new();
                for (name, entry) in requested {
                    links.insert(name.clone(), answer_entry(entry, control_port, data_port));
                }
                Value::Dictionary(links)
            }
            Some(Value::Array(requested)) => Value::Array(
                requested
                    .iter()
                    .map(|entry| answer_entry(entry, control_port, data_port))
                    .collect(),
            ),
            _ => Value::Array(Vec::new()),
        };

        debug!(
            target: "ap2.stream.subconn",
            control_port,
            data_port,
            debug_session,
            "Negotiated sub-connections"
        );

        SubConnectionSet(answer)
    }
}

fn answer_entry(entry: &Value, control_port: u16, data_port: u16) -> Value {
    let mut reply = Dictionary::new();
    if let Some(id) = entry
        .as_dictionary()
        .and_then(|fields| fields.get("streamConnectionID"))
    {
        reply.insert("streamConnectionID".to_string(), id.clone());
    }
    reply.insert(
        "controlPort".to_string(),
        Value::from(u64::from(control_port)),
    );
    reply.insert("dataPort".to_string(), Value::from(u64::from(data_port)));
    Value::Dictionary(reply)
}

//! Messages exchanged over the peer link.
//!
//! Structured messages travel as JSON objects tagged by a `type` field:
//!
//! ```text
//! {"type":"control","sensing_interval_ms":60000,"sensing_enabled":true}
//! {"type":"sensor_data","temperature":24.1,"humidity":58.3,"voltage":4.02,
//!  "current":81.5,"power":327.6,"timestamp":5120,"boot_count":17}
//! ```
//!
//! Anything that does not decode as one of these shapes is handed to the
//! caller as raw bytes, so fixed-layout records still get through.

use super::record::FixedRecord;
use serde::{Deserialize, Serialize};

/// Opaque marker sent to the experiment controller on first boot.
///
/// The controller only looks at the sender; the content carries no fields.
pub const EXPERIMENT_START_MARKER: &[u8] = b"experiment_start";

/// A structured, self-describing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// Telemetry from the node to the gateway peer.
    SensorData(SensorData),
    /// Settings update from a peer to the node.
    Control(ControlMessage),
}

/// Telemetry record for one wake cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorData {
    /// Temperature in °C.
    pub temperature: f64,
    /// Relative humidity in %.
    pub humidity: f64,
    /// Bus voltage in V.
    pub voltage: f64,
    /// Current in mA.
    pub current: f64,
    /// Power in mW.
    pub power: f64,
    /// Milliseconds since this wake.
    pub timestamp: u64,
    /// Boot counter for this wake.
    pub boot_count: u32,
}

/// Control message. Both fields are optional and applied independently.
///
/// The interval is signed: a negative value decodes and then fails the
/// range check like any other interval below the minimum. It must be a JSON
/// integer; a fractional or quoted interval fails decoding for the whole
/// message, and `sensing_enabled` from that frame is not applied either.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensing_interval_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensing_enabled: Option<bool>,
}

impl Message {
    /// Encode as JSON bytes.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decode from JSON bytes. Unknown tags and wrong shapes are errors.
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A received payload after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A structured message with a recognised `type`.
    Message(Message),
    /// Bytes that did not decode as a structured message.
    Raw(Vec<u8>),
}

impl Payload {
    /// Try structured decoding first, falling back to the raw bytes.
    pub fn decode(bytes: Vec<u8>) -> Self {
        match Message::decode(&bytes) {
            Ok(message) => Self::Message(message),
            Err(_) => Self::Raw(bytes),
        }
    }

    /// The control message, if this payload is one.
    pub fn as_control(&self) -> Option<&ControlMessage> {
        match self {
            Self::Message(Message::Control(control)) => Some(control),
            _ => None,
        }
    }

    /// Apply a fixed-layout decoder to raw bytes.
    pub fn decode_record<T: FixedRecord>(&self) -> Option<T> {
        match self {
            Self::Raw(bytes) => T::from_bytes(bytes),
            Self::Message(_) => None,
        }
    }
}

/// A payload to transmit.
#[derive(Debug, Clone, Copy)]
pub enum Outgoing<'a> {
    /// Serialized as JSON before transmission.
    Message(&'a Message),
    /// Sent unchanged.
    Bytes(&'a [u8]),
}

impl<'a> From<&'a Message> for Outgoing<'a> {
    fn from(message: &'a Message) -> Self {
        Self::Message(message)
    }
}

impl<'a> From<&'a [u8]> for Outgoing<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Bytes(bytes)
    }
}

impl<'a> Outgoing<'a> {
    /// Wire bytes for this payload.
    pub fn to_bytes(self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Message(message) => message.encode(),
            Self::Bytes(bytes) => Ok(bytes.to_vec()),
        }
    }
}

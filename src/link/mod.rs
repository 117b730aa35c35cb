//! Wireless peer messaging.
//!
//! This module contains:
//! - [`address`]: 6-byte peer addresses
//! - [`message`]: tagged structured messages and payload decoding
//! - [`record`]: fixed-layout binary records
//! - [`peer_link`]: the peer table and send/receive contract over a [`Radio`]
//! - [`espnow`]: ESP-NOW radio driver (ESP32 only)

mod address;
mod message;
mod peer_link;
mod record;

#[cfg(feature = "esp32")]
mod espnow;

use std::fmt;
use std::time::Duration;

pub use address::{AddressError, PeerAddress, ADDRESS_LEN};
pub use message::{
    ControlMessage, Message, Outgoing, Payload, SensorData, EXPERIMENT_START_MARKER,
};
pub use peer_link::PeerLink;
pub use record::{FixedRecord, PowerSample, WakeTimingSample};

#[cfg(feature = "esp32")]
pub use espnow::EspNowRadio;

/// Maximum ESP-NOW payload in bytes.
pub const ESPNOW_MTU: usize = 250;

/// A frame as delivered by the radio driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Sender address.
    pub src: PeerAddress,
    /// Undecoded payload.
    pub data: Vec<u8>,
}

/// Raw radio driver: peer registration plus byte-level send and receive.
///
/// Implementations report faults as [`LinkError`]; [`PeerLink`] turns them
/// into booleans and absent results for its callers.
pub trait Radio {
    /// Register a peer with the driver's own peer table.
    fn add_peer(&mut self, addr: PeerAddress) -> Result<(), LinkError>;

    /// Hand one frame to the radio for transmission to `addr`.
    ///
    /// `Ok` means the local radio accepted the frame, not that it arrived.
    fn send(&mut self, addr: PeerAddress, data: &[u8]) -> Result<(), LinkError>;

    /// Wait for a frame. `None` blocks without a deadline.
    ///
    /// Returns `Ok(None)` when the timeout elapses with nothing received.
    fn recv(&mut self, timeout: Option<Duration>) -> Result<Option<Frame>, LinkError>;

    /// Release the radio. No other call is valid afterwards.
    fn shutdown(&mut self) -> Result<(), LinkError>;
}

/// Link and radio errors.
#[derive(Debug)]
pub enum LinkError {
    /// Target was never registered.
    UnknownPeer(PeerAddress),
    /// Payload exceeds the radio MTU.
    PayloadTooLarge { size: usize, max: usize },
    /// Payload could not be serialized.
    Encode(String),
    /// Radio has been shut down or its channel is gone.
    Closed,
    /// ESP-IDF driver error.
    #[cfg(feature = "esp32")]
    Esp(esp_idf_sys::EspError),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPeer(addr) => write!(f, "peer {} not registered", addr),
            Self::PayloadTooLarge { size, max } => {
                write!(f, "payload too large: {} bytes (max {})", size, max)
            }
            Self::Encode(msg) => write!(f, "encode error: {}", msg),
            Self::Closed => write!(f, "radio closed"),
            #[cfg(feature = "esp32")]
            Self::Esp(e) => write!(f, "ESP error: {:?}", e),
        }
    }
}

impl std::error::Error for LinkError {}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for LinkError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Esp(e)
    }
}

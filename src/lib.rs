//! ESP-NOW sensor node firmware library.
//!
//! A battery-powered node wakes, listens briefly for control messages from
//! its peers, sends one telemetry frame and deep-sleeps again. Everything
//! except the ESP-IDF drivers is platform-independent and tested on the host.
//!
//! - [`link`]: peer table and message encoding over an ESP-NOW style radio
//! - [`settings`] / [`boot`]: the two records persisted across deep sleep
//! - [`controller`]: the per-wake state machine
//! - [`supervisor`]: top-level fault policy
//! - [`instrument`]: wake-latency and power logging instruments
//! - [`sim`]: in-process radio for host runs

pub mod boot;
pub mod config;
pub mod controller;
pub mod instrument;
pub mod link;
pub mod persistence;
pub mod platform;
pub mod sensors;
pub mod settings;
pub mod sim;
pub mod supervisor;

#[cfg(test)]
mod test_support;

// Re-export commonly used items
pub use boot::BootAccountant;
pub use config::{ConfigError, NodeConfig};
pub use controller::{CycleError, CycleReport, CycleState, DutyCycleController};
pub use link::{LinkError, Message, Payload, PeerAddress, PeerLink, Radio};
pub use persistence::{FileStorage, MemoryStorage, Storage, StorageError};
pub use settings::{NodeSettings, SettingsStore};
pub use supervisor::{supervise, Verdict};

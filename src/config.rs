//! Node configuration.
//!
//! Platform-independent so it can be validated in host tests. Firmware
//! builds can override the peer addresses and Wi-Fi channel at compile time:
//!
//! ```text
//! NODE_TELEMETRY_PEER=ac:67:b2:2a:7e:88 NODE_WIFI_CHANNEL=6 cargo build --features esp32
//! ```
//!
//! ```
//! use espnow_sensor_node::config::NodeConfig;
//!
//! let config = NodeConfig::default();
//! assert!(config.validate().is_ok());
//! assert_eq!(config.listen_window().as_millis(), 4900);
//! ```

use crate::link::{AddressError, PeerAddress};
use std::fmt;
use std::time::Duration;

pub use crate::settings::{DEFAULT_SLEEP_MS, MIN_SLEEP_MS};

/// Gateway that receives telemetry.
pub const TELEMETRY_PEER: PeerAddress = PeerAddress::new([0xac, 0x67, 0xb2, 0x2a, 0x7e, 0x88]);

/// Experiment controller notified on first boot.
pub const EXPERIMENT_PEER: PeerAddress = PeerAddress::new([0x78, 0x21, 0x84, 0x9d, 0x1b, 0x00]);

/// Awake time per cycle.
pub const ACTIVE_WINDOW: Duration = Duration::from_millis(5000);

/// Listening stops this long before the window closes.
pub const LISTEN_MARGIN: Duration = Duration::from_millis(100);

/// Timeout for each receive call while listening.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Delay between a top-level fault and the hardware reset.
pub const FAULT_RESET_DELAY: Duration = Duration::from_secs(5);

/// Wi-Fi channel shared by all ESP-NOW peers.
pub const WIFI_CHANNEL: u8 = 1;

/// Highest 2.4 GHz channel.
pub const MAX_WIFI_CHANNEL: u8 = 13;

const TELEMETRY_PEER_ENV: Option<&str> = option_env!("NODE_TELEMETRY_PEER");
const EXPERIMENT_PEER_ENV: Option<&str> = option_env!("NODE_EXPERIMENT_PEER");
const WIFI_CHANNEL_ENV: Option<&str> = option_env!("NODE_WIFI_CHANNEL");

/// Fixed parameters of a duty cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    pub telemetry_peer: PeerAddress,
    pub experiment_peer: PeerAddress,
    pub active_window: Duration,
    pub listen_margin: Duration,
    pub poll_timeout: Duration,
    pub fault_reset_delay: Duration,
    pub wifi_channel: u8,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            telemetry_peer: TELEMETRY_PEER,
            experiment_peer: EXPERIMENT_PEER,
            active_window: ACTIVE_WINDOW,
            listen_margin: LISTEN_MARGIN,
            poll_timeout: POLL_TIMEOUT,
            fault_reset_delay: FAULT_RESET_DELAY,
            wifi_channel: WIFI_CHANNEL,
        }
    }
}

impl NodeConfig {
    /// Defaults with any compile-time overrides applied.
    pub fn from_build_env() -> Result<Self, ConfigError> {
        Self::from_overrides(TELEMETRY_PEER_ENV, EXPERIMENT_PEER_ENV, WIFI_CHANNEL_ENV)
    }

    fn from_overrides(
        telemetry_peer: Option<&str>,
        experiment_peer: Option<&str>,
        wifi_channel: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(s) = telemetry_peer.filter(|s| !s.is_empty()) {
            config.telemetry_peer = s.parse().map_err(ConfigError::InvalidPeer)?;
        }
        if let Some(s) = experiment_peer.filter(|s| !s.is_empty()) {
            config.experiment_peer = s.parse().map_err(ConfigError::InvalidPeer)?;
        }
        if let Some(s) = wifi_channel.filter(|s| !s.is_empty()) {
            config.wifi_channel = s
                .parse()
                .map_err(|_| ConfigError::InvalidChannel(s.to_string()))?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_margin >= self.active_window {
            return Err(ConfigError::MarginExceedsWindow {
                margin_ms: self.listen_margin.as_millis() as u64,
                window_ms: self.active_window.as_millis() as u64,
            });
        }
        if self.poll_timeout.is_zero() {
            return Err(ConfigError::ZeroPollTimeout);
        }
        if !(1..=MAX_WIFI_CHANNEL).contains(&self.wifi_channel) {
            return Err(ConfigError::InvalidChannel(self.wifi_channel.to_string()));
        }
        if self.telemetry_peer == self.experiment_peer {
            return Err(ConfigError::DuplicatePeer(self.telemetry_peer));
        }
        Ok(())
    }

    /// How long the node listens for control messages.
    pub fn listen_window(&self) -> Duration {
        self.active_window.saturating_sub(self.listen_margin)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Peer address did not parse.
    InvalidPeer(AddressError),
    /// Wi-Fi channel outside 1-13 or not a number.
    InvalidChannel(String),
    /// Listen margin leaves no listening time.
    MarginExceedsWindow { margin_ms: u64, window_ms: u64 },
    /// Receive timeout of zero would spin.
    ZeroPollTimeout,
    /// Telemetry and experiment peers are the same station.
    DuplicatePeer(PeerAddress),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidPeer(e) => write!(f, "invalid peer address: {}", e),
            Self::InvalidChannel(ch) => {
                write!(f, "invalid Wi-Fi channel {:?} (1-{})", ch, MAX_WIFI_CHANNEL)
            }
            Self::MarginExceedsWindow {
                margin_ms,
                window_ms,
            } => write!(
                f,
                "listen margin {}ms must be shorter than the active window {}ms",
                margin_ms, window_ms
            ),
            Self::ZeroPollTimeout => write!(f, "receive timeout must be non-zero"),
            Self::DuplicatePeer(addr) => {
                write!(f, "telemetry and experiment peer are both {}", addr)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

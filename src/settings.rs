//! Persisted node settings.
//!
//! The record is a small JSON object under the `settings` key:
//!
//! ```text
//! {"sensing_enabled":true,"sleep_time_ms":20000}
//! ```
//!
//! A missing record, or one that does not parse, yields the defaults. A
//! record missing one field keeps the default for that field alone.

use crate::link::ControlMessage;
use crate::persistence::Storage;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Storage key for the settings record.
pub const SETTINGS_KEY: &str = "settings";

/// Shortest sleep the node will accept, in milliseconds.
pub const MIN_SLEEP_MS: u64 = 1000;

/// Sleep duration used when nothing is stored, in milliseconds.
pub const DEFAULT_SLEEP_MS: u64 = 20_000;

fn default_enabled() -> bool {
    true
}

fn default_sleep_ms() -> u64 {
    DEFAULT_SLEEP_MS
}

/// Settings owned by the duty-cycle controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    #[serde(default = "default_enabled")]
    pub sensing_enabled: bool,
    #[serde(default = "default_sleep_ms")]
    pub sleep_time_ms: u64,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            sensing_enabled: true,
            sleep_time_ms: DEFAULT_SLEEP_MS,
        }
    }
}

impl NodeSettings {
    /// Sleep duration for the next deep sleep.
    pub fn sleep_duration(&self) -> Duration {
        Duration::from_millis(self.sleep_time_ms)
    }

    /// Apply a control message. Returns `true` if anything changed.
    ///
    /// An interval below [`MIN_SLEEP_MS`] is ignored. A valid interval sets
    /// the sleep time to `max(interval - active_window, MIN_SLEEP_MS)`.
    pub fn apply_control(&mut self, control: &ControlMessage, active_window: Duration) -> bool {
        let mut changed = false;

        if let Some(enabled) = control.sensing_enabled {
            if enabled != self.sensing_enabled {
                self.sensing_enabled = enabled;
                changed = true;
                info!("Sensing {}", if enabled { "enabled" } else { "disabled" });
            }
        }

        if let Some(interval_ms) = control.sensing_interval_ms {
            if interval_ms >= MIN_SLEEP_MS as i64 {
                let window_ms = active_window.as_millis() as u64;
                let sleep_ms = (interval_ms as u64)
                    .saturating_sub(window_ms)
                    .max(MIN_SLEEP_MS);
                if sleep_ms != self.sleep_time_ms {
                    self.sleep_time_ms = sleep_ms;
                    changed = true;
                    info!("Sleep time updated to {}ms", sleep_ms);
                }
            } else {
                warn!("Ignoring sensing interval {}ms (min {}ms)", interval_ms, MIN_SLEEP_MS);
            }
        }

        changed
    }
}

/// Loads and saves [`NodeSettings`] through a [`Storage`] backend.
pub struct SettingsStore<S: Storage> {
    storage: S,
}

impl<S: Storage> SettingsStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Load persisted settings, or the defaults.
    pub fn load(&self) -> NodeSettings {
        let bytes = match self.storage.read(SETTINGS_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                info!("Using default settings");
                return NodeSettings::default();
            }
            Err(e) => {
                warn!("Failed to read settings: {}", e);
                return NodeSettings::default();
            }
        };

        match serde_json::from_slice::<NodeSettings>(&bytes) {
            Ok(mut settings) => {
                settings.sleep_time_ms = settings.sleep_time_ms.max(MIN_SLEEP_MS);
                info!(
                    "Settings loaded: enabled={}, sleep={}ms",
                    settings.sensing_enabled, settings.sleep_time_ms
                );
                settings
            }
            Err(e) => {
                warn!("Stored settings are corrupt ({}), using defaults", e);
                NodeSettings::default()
            }
        }
    }

    /// Overwrite the persisted record. Returns `false` if the write failed;
    /// the failure is logged and the caller keeps its in-memory value.
    pub fn save(&mut self, settings: &NodeSettings) -> bool {
        let bytes = match serde_json::to_vec(settings) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Settings save error: {}", e);
                return false;
            }
        };
        match self.storage.write(SETTINGS_KEY, &bytes) {
            Ok(()) => true,
            Err(e) => {
                warn!("Settings save error: {}", e);
                false
            }
        }
    }
}

//! Boot counter persisted across deep sleep.
//!
//! The count is stored as decimal text under `boot_count`. The first boot of
//! a run (count 1) blocks until the experiment-start marker has been accepted
//! by the radio for the experiment controller.

use crate::link::{LinkError, PeerAddress, PeerLink, Radio, EXPERIMENT_START_MARKER};
use crate::persistence::Storage;
use log::{info, warn};

/// Storage key for the boot counter.
pub const BOOT_COUNT_KEY: &str = "boot_count";

/// Loads, increments and persists the boot counter.
pub struct BootAccountant<S: Storage> {
    storage: S,
}

impl<S: Storage> BootAccountant<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Last persisted count, 0 if absent or unreadable.
    pub fn last_boot_count(&self) -> u32 {
        let bytes = match self.storage.read(BOOT_COUNT_KEY) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return 0,
            Err(e) => {
                warn!("Failed to read boot count: {}", e);
                return 0;
            }
        };
        match std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok())
        {
            Some(count) => count,
            None => {
                warn!("Stored boot count is corrupt, starting from 0");
                0
            }
        }
    }

    /// Increment and persist the counter, returning the new count.
    ///
    /// When the new count is 1 this blocks until the start marker is
    /// accepted for `experiment_peer`, and only then persists. A failed
    /// write is logged and the count is still returned. The counter
    /// saturates at `u32::MAX`: from there every wake reports the same count.
    pub fn next_boot_count<R: Radio>(
        &mut self,
        link: &mut PeerLink<R>,
        experiment_peer: PeerAddress,
    ) -> Result<u32, LinkError> {
        let last = self.last_boot_count();
        let count = last.saturating_add(1);
        if count == last {
            warn!("Boot count saturated at {}, no longer increasing", count);
        }

        if count == 1 {
            info!("First boot of run, signalling experiment start");
            link.send_until_acknowledged_target(EXPERIMENT_START_MARKER, experiment_peer)?;
        }

        if let Err(e) = self
            .storage
            .write(BOOT_COUNT_KEY, count.to_string().as_bytes())
        {
            warn!("Failed to persist boot count {}: {}", count, e);
        }
        info!("Boot count: {}", count);
        Ok(count)
    }

    /// Forget the counter so the next wake starts a new run.
    pub fn reset(&mut self) -> bool {
        match self.storage.remove(BOOT_COUNT_KEY) {
            Ok(()) => {
                info!("Boot count reset");
                true
            }
            Err(e) => {
                warn!("Failed to reset boot count: {}", e);
                false
            }
        }
    }
}

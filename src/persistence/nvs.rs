//! NVS-backed storage for the ESP32.
//!
//! Records live in their own NVS namespace as raw blobs. Every write is read
//! back and compared, which catches flash write failures that do not return
//! an error code.

use super::{validate_key, Storage, StorageError};
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use log::debug;

/// NVS namespace for the node's records.
const NVS_NAMESPACE: &str = "sensor_node";

/// Largest value this store reads back. Both records are well under this.
const MAX_VALUE_LEN: usize = 256;

/// Key-value storage in an NVS namespace.
pub struct NvsStorage {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStorage {
    /// Open the node namespace on the default partition.
    ///
    /// The partition handle is cheap to clone; the Wi-Fi driver needs one too.
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, StorageError> {
        let nvs = EspNvs::new(partition, NVS_NAMESPACE, true)?;
        Ok(Self { nvs })
    }
}

impl Storage for NvsStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        let mut buf = [0u8; MAX_VALUE_LEN];
        match self.nvs.get_raw(key, &mut buf)? {
            Some(bytes) => Ok(Some(bytes.to_vec())),
            None => {
                debug!("No {} record in NVS", key);
                Ok(None)
            }
        }
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        self.nvs.set_raw(key, value)?;

        // Read back and verify to catch silent flash write failures
        let mut verify_buf = [0u8; MAX_VALUE_LEN];
        let read_back = self
            .nvs
            .get_raw(key, &mut verify_buf)?
            .ok_or_else(|| StorageError::VerifyFailed(key.to_string()))?;
        if read_back != value {
            log::error!("NVS verification failed for {} - data mismatch after save", key);
            return Err(StorageError::VerifyFailed(key.to_string()));
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.nvs.remove(key)?;
        Ok(())
    }
}

//! Non-volatile key-value storage.
//!
//! The node keeps two small records across deep sleep: the settings record
//! and the boot counter. Both go through [`Storage`], which has three
//! backends:
//!
//! - [`FileStorage`]: one file per key in a directory (host)
//! - [`MemoryStorage`]: shared in-memory map (tests, simulation)
//! - [`NvsStorage`]: ESP-IDF NVS namespace (ESP32 only)
//!
//! Writers must leave the previous value intact when a write fails part way.

mod file;
mod memory;

#[cfg(feature = "esp32")]
mod nvs;

pub use file::{default_data_dir, FileStorage};
pub use memory::MemoryStorage;

#[cfg(feature = "esp32")]
pub use nvs::NvsStorage;

use std::fmt;
use std::io;

/// Maximum key length (NVS limit).
pub const MAX_KEY_LEN: usize = 15;

/// Byte-oriented key-value store.
pub trait Storage {
    /// Read a value. `Ok(None)` if the key has never been written.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Replace a value.
    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Delete a value. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for &mut S {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        (**self).read(key)
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        (**self).write(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Check a key against the portable key rules.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid_chars = key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if key.is_empty() || key.len() > MAX_KEY_LEN || !valid_chars {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

/// Storage errors.
#[derive(Debug)]
pub enum StorageError {
    /// Key is empty, too long, or has characters outside `[A-Za-z0-9_-]`.
    InvalidKey(String),
    /// Value read back after a write did not match.
    VerifyFailed(String),
    /// Filesystem error.
    Io(io::Error),
    /// Backend refused the operation.
    Unavailable(&'static str),
    /// ESP-IDF NVS error.
    #[cfg(feature = "esp32")]
    Nvs(esp_idf_sys::EspError),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidKey(key) => write!(f, "invalid storage key: {:?}", key),
            Self::VerifyFailed(key) => write!(f, "verification failed for key {:?}", key),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Unavailable(why) => write!(f, "storage unavailable: {}", why),
            #[cfg(feature = "esp32")]
            Self::Nvs(e) => write!(f, "NVS error: {:?}", e),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(feature = "esp32")]
impl From<esp_idf_sys::EspError> for StorageError {
    fn from(e: esp_idf_sys::EspError) -> Self {
        Self::Nvs(e)
    }
}

//! File-backed storage for host builds.
//!
//! Each key is a file in the data directory, `~/.espnow-sensor-node/` by
//! default. Writes go to `<key>.tmp` first and are renamed over the old file,
//! then read back, so an interrupted write leaves the previous value.

use super::{validate_key, Storage, StorageError};
use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Get the default data directory.
///
/// Returns `~/.espnow-sensor-node`
pub fn default_data_dir() -> io::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| io::Error::new(io::ErrorKind::NotFound, "HOME not set"))?;
    Ok(PathBuf::from(home).join(".espnow-sensor-node"))
}

/// Directory of one-file-per-key records.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Open (and create if needed) a storage directory.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        info!("File storage at {:?}", dir);
        Ok(Self { dir })
    }

    /// Storage directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No record at {:?}", path);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = path.with_extension("tmp");

        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;

        // Verify write by reading back
        let read_back = fs::read(&path)?;
        if read_back != value {
            return Err(StorageError::VerifyFailed(key.to_string()));
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

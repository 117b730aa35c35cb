//! In-memory storage.
//!
//! Clones share the same map, so a test can hand one clone to a cycle and
//! keep another to inspect what survived it.

use super::{validate_key, Storage, StorageError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, Vec<u8>>,
    failing_writes: usize,
    failing_reads: bool,
}

/// Shared in-memory key-value map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` writes without touching stored values.
    pub fn fail_next_writes(&self, n: usize) {
        self.lock().failing_writes = n;
    }

    /// Make every read fail until switched off.
    pub fn fail_reads(&self, failing: bool) {
        self.lock().failing_reads = failing;
    }

    /// Raw value, bypassing failure injection.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().values.get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        validate_key(key)?;
        let inner = self.lock();
        if inner.failing_reads {
            return Err(StorageError::Unavailable("read failure injected"));
        }
        Ok(inner.values.get(key).cloned())
    }

    fn write(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;
        let mut inner = self.lock();
        if inner.failing_writes > 0 {
            inner.failing_writes -= 1;
            return Err(StorageError::Unavailable("write failure injected"));
        }
        inner.values.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.lock().values.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_values() {
        let mut a = MemoryStorage::new();
        let b = a.clone();
        a.write("settings", b"x").unwrap();
        assert_eq!(b.read("settings").unwrap(), Some(b"x".to_vec()));
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let mut store = MemoryStorage::new();
        store.write("boot_count", b"3").unwrap();
        store.fail_next_writes(1);
        assert!(store.write("boot_count", b"4").is_err());
        assert_eq!(store.peek("boot_count"), Some(b"3".to_vec()));
        store.write("boot_count", b"4").unwrap();
        assert_eq!(store.peek("boot_count"), Some(b"4".to_vec()));
    }

    #[test]
    fn test_injected_read_failure() {
        let store = MemoryStorage::new();
        store.fail_reads(true);
        assert!(store.read("settings").is_err());
        store.fail_reads(false);
        assert_eq!(store.read("settings").unwrap(), None);
    }
}

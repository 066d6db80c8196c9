//! An in-process stand-in for any `StateStorage` backend.
//!
//! *  Seed a raw value with `RecordingStorage::with_item(key, raw)`.
//! *  Flip `fail_reads` / `fail_writes` to simulate an unavailable medium.
//! *  Inspect every successful `set_item` through `write_history()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use wallet_core::{StateStorage, StorageError};

#[derive(Default)]
pub struct RecordingStorage {
    items: Mutex<HashMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl RecordingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_item(key: &str, raw: &str) -> Arc<Self> {
        let storage = Self::default();
        storage.items.lock().insert(key.to_string(), raw.to_string());
        Arc::new(storage)
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    /// The decoded `state` object currently stored under `key`.
    pub fn stored_state(&self, key: &str) -> Option<serde_json::Value> {
        let raw = self.raw(key)?;
        let record: serde_json::Value = serde_json::from_str(&raw).ok()?;
        Some(record["state"].clone())
    }

    pub fn write_history(&self) -> Vec<(String, String)> {
        self.writes.lock().clone()
    }
}

#[async_trait]
impl StateStorage for RecordingStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("reads disabled by test".into()));
        }
        Ok(self.items.lock().get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("writes disabled by test".into()));
        }
        self.items.lock().insert(key.to_string(), value.to_string());
        self.writes.lock().push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.lock().remove(key);
        Ok(())
    }
}

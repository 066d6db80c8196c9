use async_trait::async_trait;

use crate::errors::StorageError;

/// A generic key-value medium the persisted record is written through
/// (browser local storage, a directory of files, an in-memory map...).
///
/// Implementations must be shareable across tasks: the store writes from a
/// background task while callers may still read through their own handle.
#[async_trait]
pub trait StateStorage: Send + Sync {
    /// `Ok(None)` when nothing is stored under `key`.
    async fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;
    async fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

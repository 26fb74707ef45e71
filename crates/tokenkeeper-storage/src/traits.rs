//! Storage trait definitions.

use crate::StorageResult;

/// Trait for key-value storage backends.
pub trait KeyValueStorage: Send + Sync {
    /// Retrieve a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store a value, replacing any previous one
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a value. Returns true if something was removed.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Check if a key exists
    fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

//! Session-scoped in-memory storage.

use crate::{KeyValueStorage, StorageResult};
use parking_lot::Mutex;
use std::collections::HashMap;

/// In-memory storage. Contents live exactly as long as the value itself,
/// which makes it the session-scoped backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.data.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        self.data.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        Ok(self.data.lock().remove(key).is_some())
    }
}

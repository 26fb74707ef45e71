//! Retention scopes and backend selection.

use crate::{KeyValueStorage, MemoryStorage, StorageError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Retention scope of persisted state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageScope {
    /// Cleared when the owning process/session ends.
    #[default]
    Session,
    /// Survives restarts.
    Local,
}

impl StorageScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Local => "local",
        }
    }
}

impl fmt::Display for StorageScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageScope {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "local" => Ok(Self::Local),
            other => Err(StorageError::Encoding(format!(
                "unknown storage scope: {}",
                other
            ))),
        }
    }
}

/// One storage backend per retention scope.
#[derive(Clone)]
pub struct StorageBackends {
    session: Arc<dyn KeyValueStorage>,
    local: Arc<dyn KeyValueStorage>,
}

impl StorageBackends {
    pub fn new(session: Arc<dyn KeyValueStorage>, local: Arc<dyn KeyValueStorage>) -> Self {
        Self { session, local }
    }

    /// Both scopes backed by separate in-memory stores.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(MemoryStorage::new()),
        )
    }

    /// Resolve the backend for a scope.
    pub fn resolve(&self, scope: StorageScope) -> Arc<dyn KeyValueStorage> {
        match scope {
            StorageScope::Session => self.session.clone(),
            StorageScope::Local => self.local.clone(),
        }
    }
}

impl fmt::Debug for StorageBackends {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageBackends").finish_non_exhaustive()
    }
}

//! Key-value storage abstraction for persisted authentication state.
//!
//! This crate provides the storage surface the token lifecycle engine writes
//! through, plus two backends with different retention scopes:
//! - **Session**: [`MemoryStorage`], lives as long as the process
//! - **Local**: [`FileStorage`], one file per key under a base directory

mod file;
mod keys;
mod memory;
mod scope;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use scope::{StorageBackends, StorageScope};
pub use traits::KeyValueStorage;

use thiserror::Error;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific storage error
    #[error("Platform storage error: {0}")]
    Platform(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

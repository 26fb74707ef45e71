//! Long-lived file-backed storage.
//!
//! Each key maps to one file under the base directory. Key characters outside
//! `[A-Za-z0-9_-]` are percent-encoded so distinct keys never share a file.
//! Writes go to a sibling temp file which is then renamed over the target, so
//! a reader never observes a partially written value.

use crate::{KeyValueStorage, StorageError, StorageResult};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const FILE_EXTENSION: &str = "json";

/// File-backed storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_dir: PathBuf,
}

impl FileStorage {
    /// Create a storage rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::Encoding("storage key must not be empty".to_string()));
        }
        Ok(self
            .base_dir
            .join(format!("{}.{}", encode_key(key), FILE_EXTENSION)))
    }
}

fn encode_key(key: &str) -> String {
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let tmp_path = path.with_extension(format!("{}.tmp", FILE_EXTENSION));

        {
            let mut file = fs::File::create(&tmp_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(value.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        debug!(path = %path.display(), bytes = value.len(), "Wrote storage entry");
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

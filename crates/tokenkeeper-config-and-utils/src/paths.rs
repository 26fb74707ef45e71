//! File system paths for tokenkeeper.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Directory name under the home directory.
const BASE_DIR_NAME: &str = ".tokenkeeper";

/// Manages file system paths for tokenkeeper.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.tokenkeeper)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.tokenkeeper`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| CoreError::Path("Could not determine home directory".to_string()))?;

        Ok(Self {
            base_dir: home.join(BASE_DIR_NAME),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.tokenkeeper).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.tokenkeeper/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Directory holding persisted auth state for the local scope.
    pub fn storage_dir(&self) -> PathBuf {
        self.base_dir.join("storage")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        std::fs::create_dir_all(&self.base_dir)?;
        std::fs::create_dir_all(self.storage_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_with_base_dir() {
        let base = PathBuf::from("/tmp/test-tokenkeeper");
        let paths = Paths::with_base_dir(base.clone());

        assert_eq!(paths.base_dir(), &base);
        assert_eq!(paths.config_file(), base.join("config.json"));
        assert_eq!(paths.storage_dir(), base.join("storage"));
    }

    #[test]
    fn test_paths_default() {
        let paths = Paths::new().unwrap();
        let home = dirs::home_dir().unwrap();

        assert_eq!(paths.base_dir(), &home.join(".tokenkeeper"));
    }

    #[test]
    fn test_ensure_dirs_creates_directories() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("tokenkeeper");
        let paths = Paths::with_base_dir(base.clone());

        assert!(!base.exists());

        paths.ensure_dirs().unwrap();

        assert!(base.is_dir());
        assert!(paths.storage_dir().is_dir());
    }

    #[test]
    fn test_ensure_dirs_idempotent() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        paths.ensure_dirs().unwrap();
        paths.ensure_dirs().unwrap();

        assert!(paths.storage_dir().exists());
    }
}

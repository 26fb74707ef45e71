//! Operator configuration.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokenkeeper_storage::{StorageKeys, StorageScope};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_LOG_LEVEL: &str = "TOKENKEEPER_LOG_LEVEL";
const ENV_STORAGE_SCOPE: &str = "TOKENKEEPER_STORAGE_SCOPE";
const ENV_KEY_PREFIX: &str = "TOKENKEEPER_KEY_PREFIX";
const ENV_DEV_TOKEN: &str = "TOKENKEEPER_DEV_TOKEN";

/// Configuration read by the tokenkeeper binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Retention scope of the persisted auth state.
    #[serde(default)]
    pub storage_scope: StorageScope,
    /// Prefix of the storage key.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Development token; when set, sign-in never reaches the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub development_token: Option<String>,
    /// Renew on startup even if the stored token is still valid.
    #[serde(default)]
    pub renew_on_mount: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_key_prefix() -> String {
    StorageKeys::DEFAULT_KEY_PREFIX.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            storage_scope: StorageScope::default(),
            key_prefix: default_key_prefix(),
            development_token: None,
            renew_on_mount: false,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from variables resolved by `lookup`. Empty values
    /// are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(level) = var(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(scope) = var(ENV_STORAGE_SCOPE) {
            self.storage_scope = scope
                .parse()
                .map_err(|err| CoreError::Config(format!("{}: {}", ENV_STORAGE_SCOPE, err)))?;
        }
        if let Some(prefix) = var(ENV_KEY_PREFIX) {
            self.key_prefix = prefix;
        }
        if let Some(token) = var(ENV_DEV_TOKEN) {
            self.development_token = Some(token);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.storage_scope, StorageScope::Session);
        assert_eq!(config.key_prefix, "tokenkeeper:");
        assert!(config.development_token.is_none());
        assert!(!config.renew_on_mount);
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "storage_scope": "local"
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.storage_scope, StorageScope::Local);
        assert_eq!(config.key_prefix, "tokenkeeper:");
    }

    #[test]
    fn test_config_load_from_malformed_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(matches!(err, CoreError::Json(_)));
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            log_level: "trace".to_string(),
            storage_scope: StorageScope::Local,
            key_prefix: "app:".to_string(),
            development_token: None,
            renew_on_mount: true,
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.key_prefix, Config::default().key_prefix);
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[
                ("TOKENKEEPER_LOG_LEVEL", "warn"),
                ("TOKENKEEPER_STORAGE_SCOPE", "Local"),
                ("TOKENKEEPER_KEY_PREFIX", "app:"),
                ("TOKENKEEPER_DEV_TOKEN", "dev-token"),
            ]))
            .unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.storage_scope, StorageScope::Local);
        assert_eq!(config.key_prefix, "app:");
        assert_eq!(config.development_token.as_deref(), Some("dev-token"));
    }

    #[test]
    fn test_empty_overrides_are_ignored() {
        let mut config = Config::default();
        config
            .apply_overrides(env(&[("TOKENKEEPER_DEV_TOKEN", "  ")]))
            .unwrap();
        assert!(config.development_token.is_none());
    }

    #[test]
    fn test_invalid_scope_override() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(env(&[("TOKENKEEPER_STORAGE_SCOPE", "cloud")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
        assert!(err.to_string().contains("TOKENKEEPER_STORAGE_SCOPE"));
    }
}

//! Engine configuration.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokenkeeper_storage::{StorageKeys, StorageScope};

/// Options recognised by the token lifecycle engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[serde(bound(deserialize = "U: DeserializeOwned"))]
pub struct LifecycleConfig<U> {
    /// Retention scope of the persisted state.
    #[serde(default)]
    pub storage_scope: StorageScope,
    /// Storage key prefix.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// When set, sign-in never calls the sign-in callback and yields this
    /// token instead (never expires).
    #[serde(default)]
    pub development_token: Option<String>,
    /// User attached to the development sign-in result.
    #[serde(default)]
    pub development_user: Option<U>,
    /// Start signed in with the development token.
    #[serde(default)]
    pub development_signed_in: bool,
    /// Attempt a renewal on mount regardless of stored auth validity.
    #[serde(default)]
    pub renew_on_mount: bool,
}

fn default_key_prefix() -> String {
    StorageKeys::DEFAULT_KEY_PREFIX.to_string()
}

impl<U> Default for LifecycleConfig<U> {
    fn default() -> Self {
        Self {
            storage_scope: StorageScope::default(),
            key_prefix: default_key_prefix(),
            development_token: None,
            development_user: None,
            development_signed_in: false,
            renew_on_mount: false,
        }
    }
}

impl<U> LifecycleConfig<U> {
    /// True when a non-empty development token is configured.
    pub fn is_development(&self) -> bool {
        self.development_token
            .as_deref()
            .is_some_and(|token| !token.is_empty())
    }

    /// Key the auth state is persisted under.
    pub fn storage_key(&self) -> String {
        StorageKeys::storage_key(&self.key_prefix, self.is_development())
    }
}

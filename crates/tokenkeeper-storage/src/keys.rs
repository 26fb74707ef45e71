//! Storage key constants.

/// Storage key composition for persisted auth state.
pub struct StorageKeys;

impl StorageKeys {
    /// Prefix used when none is configured
    pub const DEFAULT_KEY_PREFIX: &'static str = "tokenkeeper:";

    /// Suffix appended to the prefix for the auth state entry
    pub const STATE_SUFFIX: &'static str = "auth";

    /// Marker prepended to the prefix while a development token is configured,
    /// so development state never collides with production state
    pub const DEV_MARKER: &'static str = "dev:";

    /// Build the storage key for the auth state entry.
    pub fn storage_key(prefix: &str, development: bool) -> String {
        if development {
            format!("{}{}{}", Self::DEV_MARKER, prefix, Self::STATE_SUFFIX)
        } else {
            format!("{}{}", prefix, Self::STATE_SUFFIX)
        }
    }
}

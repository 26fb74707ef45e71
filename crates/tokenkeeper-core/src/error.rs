//! Lifecycle error types.

use std::sync::Arc;
use thiserror::Error;
use tokenkeeper_storage::StorageError;

/// Token lifecycle error type.
///
/// Cloneable so a single in-flight operation can hand the same failure to
/// every caller attached to it.
#[derive(Error, Debug, Clone)]
pub enum LifecycleError {
    /// Expiration input is neither a relative duration nor an absolute instant
    #[error("Invalid expiration format: {0}")]
    InvalidExpirationFormat(String),

    /// Sign-in requested without a sign-in callback or development token
    #[error("No sign-in handler configured")]
    NoSignInHandler,

    /// Renewal requested without a renew callback
    #[error("No renew handler configured")]
    NoRenewHandler,

    /// The sign-in callback rejected
    #[error("Sign-in failed: {0}")]
    SignIn(Arc<anyhow::Error>),

    /// The renew callback rejected
    #[error("Token renewal failed: {0}")]
    Renew(Arc<anyhow::Error>),

    /// Persisting state failed
    #[error("Storage error: {0}")]
    Storage(Arc<StorageError>),

    /// The engine was shut down
    #[error("Token lifecycle has been shut down")]
    Disposed,

    /// Mounted outside a tokio runtime
    #[error("Runtime unavailable: {0}")]
    Runtime(String),
}

impl From<StorageError> for LifecycleError {
    fn from(err: StorageError) -> Self {
        LifecycleError::Storage(Arc::new(err))
    }
}

impl LifecycleError {
    /// Returns true for configuration errors (missing handlers).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            LifecycleError::NoSignInHandler | LifecycleError::NoRenewHandler
        )
    }
}

/// Result type alias using LifecycleError.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_configuration() {
        assert!(LifecycleError::NoSignInHandler.is_configuration());
        assert!(LifecycleError::NoRenewHandler.is_configuration());
        assert!(!LifecycleError::Disposed.is_configuration());
        assert!(!LifecycleError::InvalidExpirationFormat("x".into()).is_configuration());
    }

    #[test]
    fn test_callback_error_message_is_preserved() {
        let err = LifecycleError::Renew(Arc::new(anyhow::anyhow!("refresh token revoked")));
        assert_eq!(err.to_string(), "Token renewal failed: refresh token revoked");
    }

    #[test]
    fn test_clone_shares_source() {
        let err = LifecycleError::SignIn(Arc::new(anyhow::anyhow!("bad password")));
        let cloned = err.clone();
        match (err, cloned) {
            (LifecycleError::SignIn(a), LifecycleError::SignIn(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("expected SignIn"),
        }
    }

    #[test]
    fn test_from_storage_error() {
        let err: LifecycleError = StorageError::Platform("locked".into()).into();
        assert!(matches!(err, LifecycleError::Storage(_)));
        assert_eq!(err.to_string(), "Storage error: Platform storage error: locked");
    }
}

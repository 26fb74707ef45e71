//! Auth state data model.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::codec;

/// Bound for the user payload carried alongside the token.
pub trait UserProfile:
    Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> UserProfile for T where
    T: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// One opaque credential plus an optional absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TokenBundle {
    pub fn new(token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// A bundle that never expires.
    pub fn permanent(token: impl Into<String>) -> Self {
        Self::new(token, None)
    }

    /// Non-empty token and not expired at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        codec::is_valid(Some(self), now)
    }
}

/// Authentication state owned by the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "U: DeserializeOwned"))]
pub struct AuthState<U> {
    /// False until the first reconciliation pass completes.
    #[serde(default)]
    pub initialized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<TokenBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew: Option<TokenBundle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<U>,
}

impl<U> Default for AuthState<U> {
    fn default() -> Self {
        Self {
            initialized: false,
            auth: None,
            renew: None,
            user: None,
        }
    }
}

impl<U> AuthState<U> {
    /// The state after sign-out or unrecoverable expiry.
    pub fn signed_out() -> Self {
        Self {
            initialized: true,
            ..Self::default()
        }
    }

    pub fn auth_valid_at(&self, now: DateTime<Utc>) -> bool {
        codec::is_valid(self.auth.as_ref(), now)
    }

    pub fn renew_valid_at(&self, now: DateTime<Utc>) -> bool {
        codec::is_valid(self.renew.as_ref(), now)
    }

    /// Derived lifecycle phase at `now`.
    pub fn phase_at(&self, now: DateTime<Utc>) -> AuthPhase {
        if !self.initialized {
            AuthPhase::Uninitialized
        } else if self.auth_valid_at(now) {
            AuthPhase::Authenticated
        } else {
            AuthPhase::Unauthenticated
        }
    }

    /// The auth token if it is valid at `now`.
    pub fn token_at(&self, now: DateTime<Utc>) -> Option<&str> {
        self.auth
            .as_ref()
            .filter(|bundle| bundle.is_valid_at(now))
            .map(|bundle| bundle.token.as_str())
    }

    /// The token held in the auth bundle, valid or not. This is the value
    /// token-change notifications compare.
    pub fn resolved_token(&self) -> Option<&str> {
        self.auth.as_ref().map(|bundle| bundle.token.as_str())
    }
}

/// Phase derived from an [`AuthState`] snapshot; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Status unknown; auth-dependent UI must not render yet.
    Uninitialized,
    Unauthenticated,
    Authenticated,
}

impl AuthPhase {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthPhase::Authenticated)
    }
}

/// Expiration input: seconds from now, or an absolute instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expiration {
    Seconds(f64),
    At(DateTime<Utc>),
}

impl From<DateTime<Utc>> for Expiration {
    fn from(at: DateTime<Utc>) -> Self {
        Expiration::At(at)
    }
}

/// Payload returned by sign-in/renew callbacks and accepted by `set_auth`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "U: DeserializeOwned"))]
pub struct ActionResult<U> {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiration: Option<Expiration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_expiration: Option<Expiration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<U>,
}

impl<U> ActionResult<U> {
    /// A result carrying only a token that never expires.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_expiration: None,
            renew: None,
            renew_expiration: None,
            user: None,
        }
    }

    pub fn expires_in(mut self, seconds: f64) -> Self {
        self.token_expiration = Some(Expiration::Seconds(seconds));
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.token_expiration = Some(Expiration::At(at));
        self
    }

    pub fn with_renew(mut self, token: impl Into<String>, expiration: Option<Expiration>) -> Self {
        self.renew = Some(token.into());
        self.renew_expiration = expiration;
        self
    }

    pub fn with_user(mut self, user: U) -> Self {
        self.user = Some(user);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_phase_derivation() {
        let mut state: AuthState<()> = AuthState::default();
        assert_eq!(state.phase_at(t0()), AuthPhase::Uninitialized);

        state.initialized = true;
        assert_eq!(state.phase_at(t0()), AuthPhase::Unauthenticated);

        state.auth = Some(TokenBundle::new("abc", Some(t0() + Duration::minutes(5))));
        assert_eq!(state.phase_at(t0()), AuthPhase::Authenticated);
        assert!(state.phase_at(t0()).is_authenticated());

        // Expired auth is unauthenticated even though the bundle is still held
        assert_eq!(
            state.phase_at(t0() + Duration::minutes(6)),
            AuthPhase::Unauthenticated
        );
        assert_eq!(state.resolved_token(), Some("abc"));
        assert_eq!(state.token_at(t0() + Duration::minutes(6)), None);
    }

    #[test]
    fn test_uninitialized_wins_over_valid_auth() {
        let state: AuthState<()> = AuthState {
            initialized: false,
            auth: Some(TokenBundle::permanent("abc")),
            renew: None,
            user: None,
        };
        assert_eq!(state.phase_at(t0()), AuthPhase::Uninitialized);
    }

    #[test]
    fn test_state_json_shape() {
        let state = AuthState {
            initialized: true,
            auth: Some(TokenBundle::new("abc", Some(t0()))),
            renew: None,
            user: Some(serde_json::json!({"id": 1})),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "initialized": true,
                "auth": {"token": "abc", "expiresAt": "2026-01-01T12:00:00Z"},
                "user": {"id": 1}
            })
        );
    }

    #[test]
    fn test_expiration_untagged() {
        let exp: Expiration = serde_json::from_str("900").unwrap();
        assert_eq!(exp, Expiration::Seconds(900.0));

        let exp: Expiration = serde_json::from_str("\"2026-01-01T12:00:00Z\"").unwrap();
        assert_eq!(exp, Expiration::At(t0()));

        assert!(serde_json::from_str::<Expiration>("\"tomorrow\"").is_err());
    }

    #[test]
    fn test_action_result_builder() {
        let result: ActionResult<u32> = ActionResult::new("abc")
            .expires_in(60.0)
            .with_renew("r", Some(Expiration::At(t0())))
            .with_user(7);
        assert_eq!(result.token, "abc");
        assert_eq!(result.token_expiration, Some(Expiration::Seconds(60.0)));
        assert_eq!(result.renew.as_deref(), Some("r"));
        assert_eq!(result.user, Some(7));
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Account {
        id: u64,
    }

    fn decode<U: UserProfile>(raw: &str) -> (AuthState<U>, ActionResult<U>) {
        let state = serde_json::from_str(raw).unwrap();
        let result = serde_json::from_str(r#"{"token": "abc"}"#).unwrap();
        (state, result)
    }

    #[test]
    fn test_user_type_without_default_decodes() {
        let (state, result): (AuthState<Account>, ActionResult<Account>) =
            decode(r#"{"initialized": true, "user": {"id": 3}}"#);
        assert_eq!(state.user, Some(Account { id: 3 }));
        assert_eq!(state.auth, None);
        assert_eq!(result.user, None);

        let (state, _): (AuthState<Account>, _) = decode::<Account>(r#"{"initialized": true}"#);
        assert_eq!(state.user, None);
    }
}

//! Token-change notifications.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

use crate::AuthState;

/// Callback receiving the state and the token it resolved to.
pub type TokenChangeFn<U> = Arc<dyn Fn(&AuthState<U>, Option<&str>) + Send + Sync>;

/// Calls the token-change callback once per distinct token value.
///
/// Values are compared by token string, so commits that only touch the user
/// or the renew bundle stay silent.
pub struct TokenNotifier<U> {
    callback: Option<TokenChangeFn<U>>,
    /// `None` until primed; then the last token delivered (or withheld).
    last: Mutex<Option<Option<String>>>,
}

impl<U> TokenNotifier<U> {
    pub fn new(callback: Option<TokenChangeFn<U>>) -> Self {
        Self {
            callback,
            last: Mutex::new(None),
        }
    }

    /// Seed the notifier with the state loaded at mount. If that state is
    /// already authenticated the callback runs synchronously, before anything
    /// else can observe the engine. Returns true if the callback ran.
    pub fn prime(&self, state: &AuthState<U>, now: DateTime<Utc>) -> bool {
        if state.auth_valid_at(now) {
            let token = state.resolved_token().map(str::to_string);
            *self.last.lock() = Some(token.clone());
            self.deliver(state, token.as_deref());
            true
        } else {
            *self.last.lock() = Some(None);
            false
        }
    }

    /// Deliver `state` if its token differs from the last one delivered.
    pub fn observe(&self, state: &AuthState<U>) -> bool {
        let token = state.resolved_token().map(str::to_string);
        {
            let mut last = self.last.lock();
            if last.as_ref() == Some(&token) {
                return false;
            }
            *last = Some(token.clone());
        }
        self.deliver(state, token.as_deref());
        true
    }

    fn deliver(&self, state: &AuthState<U>, token: Option<&str>) {
        debug!(token_present = token.is_some(), "Token changed");
        if let Some(callback) = &self.callback {
            callback(state, token);
        }
    }
}

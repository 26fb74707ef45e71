//! Shared helpers for lifecycle integration tests.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokenkeeper_core::{
    AuthState, Clock, KeyValueStorage, MemoryStorage, StorageBackends, TokenLifecycle,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
}

impl User {
    pub fn new(id: u64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
        }
    }
}

pub type Engine = TokenLifecycle<User, Credentials>;

/// Wall clock that follows tokio's paused timer, so `tokio::time::sleep`
/// in a `start_paused` test moves both timers and validity checks.
pub struct PausedClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl PausedClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            base: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            started: tokio::time::Instant::now(),
        })
    }
}

impl Clock for PausedClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.started.elapsed()).unwrap();
        self.base + elapsed
    }
}

/// Records every token delivered to the token-change callback.
#[derive(Clone, Default)]
pub struct TokenLog {
    values: Arc<Mutex<Vec<Option<String>>>>,
}

impl TokenLog {
    pub fn callback(&self) -> impl Fn(&AuthState<User>, Option<&str>) + Send + Sync + 'static {
        let values = self.values.clone();
        move |_state, token| values.lock().push(token.map(str::to_string))
    }

    pub fn values(&self) -> Vec<Option<String>> {
        self.values.lock().clone()
    }
}

/// Invocation counter shared with a callback.
#[derive(Clone, Default)]
pub struct Calls(Arc<AtomicUsize>);

impl Calls {
    pub fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Session and local in-memory stores the test can inspect.
pub struct Stores {
    pub session: Arc<MemoryStorage>,
    pub local: Arc<MemoryStorage>,
}

impl Stores {
    pub fn new() -> Self {
        Self {
            session: Arc::new(MemoryStorage::new()),
            local: Arc::new(MemoryStorage::new()),
        }
    }

    pub fn backends(&self) -> StorageBackends {
        StorageBackends::new(self.session.clone(), self.local.clone())
    }

    /// Seed the session store with a raw JSON state.
    pub fn seed_session(&self, key: &str, state: serde_json::Value) {
        self.session.set(key, &state.to_string()).unwrap();
    }

    pub fn session_state(&self, key: &str) -> Option<serde_json::Value> {
        read(self.session.as_ref(), key)
    }

    pub fn local_state(&self, key: &str) -> Option<serde_json::Value> {
        read(self.local.as_ref(), key)
    }
}

fn read(storage: &dyn KeyValueStorage, key: &str) -> Option<serde_json::Value> {
    storage
        .get(key)
        .unwrap()
        .map(|raw| serde_json::from_str(&raw).unwrap())
}

/// Let spawned reconciliation and timer tasks run without moving time.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

//! Observable, persisted auth state.
//!
//! The store is the only writer to the backing key-value storage. Every
//! committed change is persisted synchronously and then delivered to
//! subscribers as an immutable snapshot.

use parking_lot::{Mutex, ReentrantMutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokenkeeper_storage::{KeyValueStorage, StorageError, StorageResult};
use tracing::{debug, warn};

use crate::{AuthState, UserProfile};

/// Handle returned by [`StateStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

type Subscriber<U> = Arc<dyn Fn(&AuthState<U>) + Send + Sync>;

struct StorageTarget {
    storage: Arc<dyn KeyValueStorage>,
    key: String,
}

pub struct StateStore<U> {
    state: Mutex<AuthState<U>>,
    target: Mutex<StorageTarget>,
    subscribers: Mutex<BTreeMap<SubscriberId, Subscriber<U>>>,
    /// Serialises delivery so subscribers observe commits in order.
    delivery: ReentrantMutex<()>,
    next_id: AtomicU64,
}

impl<U: UserProfile> StateStore<U> {
    /// Load state from `storage`, falling back to the default state when the
    /// entry is absent or malformed. `initialized` is always reset to false:
    /// it only becomes true after a reconciliation pass in this process.
    pub fn load(storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let mut state = read_state::<U>(storage.as_ref(), &key).unwrap_or_default();
        state.initialized = false;

        Self {
            state: Mutex::new(state),
            target: Mutex::new(StorageTarget { storage, key }),
            subscribers: Mutex::new(BTreeMap::new()),
            delivery: ReentrantMutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Snapshot of the current state.
    pub fn get(&self) -> AuthState<U> {
        self.state.lock().clone()
    }

    /// Replace the state.
    pub fn set(&self, next: AuthState<U>) -> StorageResult<bool> {
        self.update(|_| next)
    }

    /// Compute the next state from the latest one and commit it.
    ///
    /// Returns `Ok(false)` without persisting or notifying when the result is
    /// equal to the current state. The in-memory state is committed even if
    /// persisting fails; the storage error is returned afterwards.
    pub fn update<F>(&self, f: F) -> StorageResult<bool>
    where
        F: FnOnce(&AuthState<U>) -> AuthState<U>,
    {
        let _delivery = self.delivery.lock();

        let (snapshot, persisted) = {
            let mut state = self.state.lock();
            let next = f(&state);
            if next == *state {
                return Ok(false);
            }
            *state = next;
            let snapshot = state.clone();
            let persisted = self.persist(&snapshot);
            (snapshot, persisted)
        };

        let subscribers: Vec<Subscriber<U>> = self.subscribers.lock().values().cloned().collect();
        for subscriber in subscribers {
            subscriber(&snapshot);
        }

        persisted.map(|()| true)
    }

    fn persist(&self, state: &AuthState<U>) -> StorageResult<()> {
        let target = self.target.lock();
        let json =
            serde_json::to_string(state).map_err(|err| StorageError::Encoding(err.to_string()))?;
        if let Err(err) = target.storage.set(&target.key, &json) {
            warn!(key = %target.key, error = %err, "Failed to persist auth state");
            return Err(err);
        }
        debug!(key = %target.key, "Persisted auth state");
        Ok(())
    }

    /// Register a callback invoked synchronously after each committed change.
    pub fn subscribe<F>(&self, f: F) -> SubscriberId
    where
        F: Fn(&AuthState<U>) + Send + Sync + 'static,
    {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().insert(id, Arc::new(f));
        id
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    /// Point the store at a different backend/key. The current in-memory
    /// state is kept and lands in the new target on the next mutation.
    pub fn retarget(&self, storage: Arc<dyn KeyValueStorage>, key: impl Into<String>) {
        let mut target = self.target.lock();
        target.storage = storage;
        target.key = key.into();
        debug!(key = %target.key, "Retargeted auth state storage");
    }

    pub fn storage_key(&self) -> String {
        self.target.lock().key.clone()
    }
}

fn read_state<U: UserProfile>(storage: &dyn KeyValueStorage, key: &str) -> Option<AuthState<U>> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!(key = %key, error = %err, "Failed to read persisted auth state, using defaults");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(key = %key, error = %err, "Persisted auth state is malformed, using defaults");
            None
        }
    }
}

impl<U> fmt::Debug for StateStore<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateStore")
            .field("key", &self.target.lock().key)
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

//! Token lifecycle engine.
//!
//! This crate provides:
//! - Sign-in, renewal, sign-out and manual override of an opaque auth token
//! - Persistence of the auth state through a pluggable key-value store
//! - Expiration-driven automatic renewal and eviction
//! - Single-flight guarding of the caller-supplied async callbacks
//! - Exactly-once-per-change token notifications
//!
//! The engine never interprets token contents and never performs network I/O
//! itself; credential exchange is supplied by the embedding application.

mod clock;
mod codec;
mod config;
mod error;
mod lifecycle;
mod notify;
mod scheduler;
mod single_flight;
mod store;
mod types;

pub use clock::{Clock, SystemClock};
pub use codec::{coerce_expiration, is_valid};
pub use config::LifecycleConfig;
pub use error::{LifecycleError, LifecycleResult};
pub use lifecycle::{LifecycleBuilder, Operation, TokenLifecycle};
pub use notify::TokenNotifier;
pub use scheduler::ExpirationTimer;
pub use single_flight::SingleFlight;
pub use store::{StateStore, SubscriberId};
pub use types::{ActionResult, AuthPhase, AuthState, Expiration, TokenBundle, UserProfile};

pub use tokenkeeper_storage::{
    FileStorage, KeyValueStorage, MemoryStorage, StorageBackends, StorageError, StorageKeys,
    StorageScope,
};

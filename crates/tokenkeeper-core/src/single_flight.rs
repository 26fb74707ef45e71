//! Request coalescing keyed by operation.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type Flights<K, T> = Mutex<HashMap<K, (u64, Shared<BoxFuture<'static, T>>)>>;

/// Collapses concurrent invocations for the same key into one execution.
///
/// While a flight is pending for a key, later callers attach to it instead of
/// invoking their own function, and every caller observes the same output.
/// A flight removes its own entry as it settles, so any call made after that
/// starts a fresh execution.
pub struct SingleFlight<K, T> {
    in_flight: Arc<Flights<K, T>>,
    generation: AtomicU64,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Run `f` under `key`, or join the flight already pending for `key`.
    pub async fn run<F, Fut>(&self, key: K, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.get(&key) {
                Some((_, pending)) => pending.clone(),
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let flights = Arc::downgrade(&self.in_flight);
                    let settle_key = key.clone();
                    let work = f();
                    let flight = async move {
                        let output = work.await;
                        if let Some(flights) = flights.upgrade() {
                            let mut in_flight = flights.lock();
                            if in_flight
                                .get(&settle_key)
                                .is_some_and(|(current, _)| *current == generation)
                            {
                                in_flight.remove(&settle_key);
                            }
                        }
                        output
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, (generation, flight.clone()));
                    flight
                }
            }
        };

        flight.await
    }

    /// True while a flight for `key` has not settled.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.lock().contains_key(key)
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

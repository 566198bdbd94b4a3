use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::Mutex;
use tracing::debug;

type FlightMap<T> = Arc<Mutex<HashMap<String, (u64, WeakShared<BoxFuture<'static, T>>)>>>;


#[derive(Debug, Clone)]
pub struct FlightOutcome<T> {
    pub value: T,
    /// True for the caller whose closure actually ran.
    pub leader: bool,
}


/// Request collapsing per key: concurrent callers of `run` with the same key
/// share one execution of the first caller's future.
///
/// The latch travels inside the shared build. It is removed when the build
/// completes, or when every waiter has dropped it, whichever comes first; a
/// caller giving up early does not release it while others still wait.
pub struct SingleFlight<T: Clone + Send + Sync + 'static> {
    in_flight: FlightMap<T>,
    next_id: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    pub async fn run<F, Fut>(&self, key: &str, make: F) -> FlightOutcome<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (flight, leader) = {
            let mut map = self.in_flight.lock();
            match map.get(key).and_then(|(_, weak)| weak.upgrade()) {
                Some(flight) => (flight, false),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let guard = FlightGuard {
                        map: Arc::clone(&self.in_flight),
                        key: key.to_string(),
                        id,
                    };
                    let build = make();
                    let flight: Shared<BoxFuture<'static, T>> = async move {
                        let _guard = guard;
                        build.await
                    }
                    .boxed()
                    .shared();
                    if let Some(weak) = flight.downgrade() {
                        map.insert(key.to_string(), (id, weak));
                    }
                    (flight, true)
                }
            }
        };

        if !leader {
            debug!("Joined in-flight build for key {}", crate::safe_truncate(key, 12));
        }

        let value = flight.await;
        FlightOutcome { value, leader }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

struct FlightGuard<T: Clone + Send + Sync + 'static> {
    map: FlightMap<T>,
    key: String,
    id: u64,
}

impl<T: Clone + Send + Sync + 'static> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        let mut map = self.map.lock();
        if map.get(&self.key).is_some_and(|(id, _)| *id == self.id) {
            map.remove(&self.key);
        }
    }
}

//! At-most-one in-flight computation per key.
//!
//! The first caller for a key spawns the computation on its own task and
//! publishes a shared handle; later callers await the same handle. The entry is
//! removed by the task itself when it finishes, so failures reach every waiter
//! that joined but are never replayed to later callers.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::domain::errors::{GatewayError, GatewayResult};

type Flight<V> = Shared<BoxFuture<'static, GatewayResult<V>>>;

pub struct SingleFlight<K, V>
where
    V: Clone,
{
    in_flight: Arc<Mutex<HashMap<K, (u64, Flight<V>)>>>,
    next_id: AtomicU64,
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `compute` for `key` unless a computation for it is already in flight,
    /// in which case wait for that one.
    ///
    /// `compute` is only invoked by the caller that starts the flight.
    pub async fn run<F, Fut>(&self, key: K, compute: F) -> GatewayResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<V>> + Send + 'static,
    {
        let flight = {
            let mut map = self.in_flight.lock();
            if let Some((_, existing)) = map.get(&key) {
                existing.clone()
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let registry = Arc::clone(&self.in_flight);
                let owned_key = key.clone();
                let work = compute();
                let handle = tokio::spawn(async move {
                    let result = work.await;
                    let mut map = registry.lock();
                    if map.get(&owned_key).is_some_and(|(current, _)| *current == id) {
                        map.remove(&owned_key);
                    }
                    result
                });
                let flight: Flight<V> = async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(err) if err.is_cancelled() => Err(GatewayError::Cancelled),
                        Err(err) => Err(GatewayError::Storage(format!(
                            "in-flight computation failed: {err}"
                        ))),
                    }
                }
                .boxed()
                .shared();
                map.insert(key, (id, flight.clone()));
                flight
            }
        };

        flight.await
    }

    /// Number of computations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.lock().contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_computation() {
        let flights = Arc::new(SingleFlight::<String, u32>::new());
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let flights = Arc::clone(&flights);
            let calls = Arc::clone(&calls);
            handles.push(tokio::spawn(async move {
                flights
                    .run("k".to_string(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_all_waiters_and_is_not_cached() {
        let flights = Arc::new(SingleFlight::<String, u32>::new());

        let a = {
            let flights = Arc::clone(&flights);
            tokio::spawn(async move {
                flights
                    .run("k".to_string(), || async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Err(GatewayError::unavailable("alpha", "503"))
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        let b = flights.run("k".to_string(), || async { Ok(1) }).await;

        assert!(matches!(b, Err(GatewayError::ProviderUnavailable { .. })));
        assert!(a.await.unwrap().is_err());

        let retry = flights.run("k".to_string(), || async { Ok(7) }).await;
        assert_eq!(retry.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_computation_survives_waiter_cancellation() {
        let flights = Arc::new(SingleFlight::<String, u32>::new());
        let done = Arc::new(AtomicU32::new(0));

        let waiter = {
            let flights = Arc::clone(&flights);
            let done = Arc::clone(&done);
            tokio::spawn(async move {
                flights
                    .run("k".to_string(), move || async move {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        done.fetch_add(1, Ordering::SeqCst);
                        Ok(1)
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        waiter.abort();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert!(!flights.is_in_flight(&"k".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_run_independently() {
        let flights = SingleFlight::<u32, u32>::new();
        let (a, b) = tokio::join!(
            flights.run(1, || async { Ok(10) }),
            flights.run(2, || async { Ok(20) })
        );
        assert_eq!(a.unwrap(), 10);
        assert_eq!(b.unwrap(), 20);
    }
}

//! Request Coalescing ("single flight")
//!
//! Deduplicates concurrent in-flight loads for the same key within one
//! process: while a load is running, every other caller for that key waits
//! for its outcome instead of starting a second load. This makes
//! cache-stampede duplicate loads for a hot missing key impossible, bounding
//! the loader to one invocation per distinct key per outstanding miss window
//! regardless of request concurrency.
//!
//! Outcomes are broadcast once and then forgotten: an error is delivered to
//! every waiter of that flight but is never cached, so the next call for the
//! key starts a fresh attempt.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use tokio::sync::broadcast;

use crate::cache::CacheValue;
use crate::error::Result;

type Outcome = Result<CacheValue>;

/// Per-key in-flight call deduplication.
pub struct SingleFlight {
    /// Key → completion channel of the flight currently executing
    inflight: DashMap<String, broadcast::Sender<Outcome>>,
}

enum Role {
    Executor,
    Waiter(broadcast::Receiver<Outcome>),
}

impl SingleFlight {
    pub fn new() -> Self {
        Self {
            inflight: DashMap::new(),
        }
    }

    /// Run `work` for `key`, coalescing with any flight already in progress.
    ///
    /// The first caller for a key becomes the executor: it registers the
    /// flight, runs `work` exactly once (outside any map lock), broadcasts
    /// the outcome to every waiter, and clears the record so a later call
    /// starts fresh. Concurrent callers for the same key suspend until that
    /// outcome arrives and receive it verbatim — `work` is not invoked a
    /// second time.
    ///
    /// If the executing future is dropped mid-flight, its record is cleared
    /// and the waiters race to become the new executor; a waiter cancelling
    /// never disturbs the shared flight.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let mut work = Some(work);
        loop {
            let role = match self.inflight.entry(key.to_owned()) {
                Entry::Occupied(entry) => Role::Waiter(entry.get().subscribe()),
                Entry::Vacant(entry) => {
                    let (tx, _rx) = broadcast::channel(1);
                    entry.insert(tx);
                    Role::Executor
                }
            };

            match role {
                Role::Executor => {
                    let guard = FlightGuard { flight: self, key };
                    let work = work.take().expect("executor role is taken once");
                    let outcome = work().await;
                    guard.finish(outcome.clone());
                    return outcome;
                }
                Role::Waiter(mut rx) => match rx.recv().await {
                    Ok(outcome) => return outcome,
                    // Executor dropped without completing; contend for a
                    // fresh flight.
                    Err(_) => continue,
                },
            }
        }
    }

    /// Number of flights currently in progress.
    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingleFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.inflight.len())
            .finish()
    }
}

/// Clears the in-flight record even if the executor is cancelled mid-work.
struct FlightGuard<'a> {
    flight: &'a SingleFlight,
    key: &'a str,
}

impl FlightGuard<'_> {
    /// Remove the record and wake every waiter with the outcome.
    fn finish(self, outcome: Outcome) {
        if let Some((_, tx)) = self.flight.inflight.remove(self.key) {
            // Waiters may all have been cancelled; nothing to deliver then.
            let _ = tx.send(outcome);
        }
        std::mem::forget(self);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flight.inflight.remove(self.key);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use assert_matches::assert_matches;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_coalesce_to_one_execution() {
        let flight = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(10));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let executions = Arc::clone(&executions);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    flight
                        .run("hot-key", || async {
                            executions.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                            Ok(CacheValue::from("shared"))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value.as_bytes(), b"shared");
        }

        assert_eq!(executions.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_errors_are_shared_but_not_cached() {
        let flight = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let flight = Arc::clone(&flight);
                let executions = Arc::clone(&executions);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    flight
                        .run("failing", || async {
                            executions.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Err(Error::load("failing", "backend down".into()))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            let outcome = handle.await.unwrap();
            assert_matches!(outcome, Err(Error::Load { .. }));
        }
        assert_eq!(executions.load(Ordering::SeqCst), 1);

        // The error was not cached: a later call runs the work again.
        let result = flight
            .run("failing", || async {
                executions.fetch_add(1, Ordering::SeqCst);
                Ok(CacheValue::from("recovered"))
            })
            .await;
        assert!(result.is_ok());
        assert_eq!(executions.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_sequential_calls_each_execute() {
        let flight = SingleFlight::new();
        let executions = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = flight
                .run("key", || async {
                    executions.fetch_add(1, Ordering::SeqCst);
                    Ok(CacheValue::from("v"))
                })
                .await
                .unwrap();
            assert_eq!(value.as_bytes(), b"v");
        }

        assert_eq!(executions.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_distinct_keys_do_not_coalesce() {
        let flight = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let flight = Arc::clone(&flight);
                let executions = Arc::clone(&executions);
                tokio::spawn(async move {
                    flight
                        .run(&format!("key-{i}"), || async {
                            executions.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            Ok(CacheValue::from("v"))
                        })
                        .await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(executions.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiter_recovers_from_cancelled_executor() {
        let flight = Arc::new(SingleFlight::new());
        let executions = Arc::new(AtomicUsize::new(0));

        let slow_flight = Arc::clone(&flight);
        let slow_executions = Arc::clone(&executions);
        let slow = tokio::spawn(async move {
            slow_flight
                .run("key", || async {
                    slow_executions.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(CacheValue::from("never"))
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        let wait_flight = Arc::clone(&flight);
        let wait_executions = Arc::clone(&executions);
        let waiter = tokio::spawn(async move {
            wait_flight
                .run("key", || async {
                    wait_executions.fetch_add(1, Ordering::SeqCst);
                    Ok(CacheValue::from("fresh"))
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        slow.abort();

        let value = waiter.await.unwrap().unwrap();
        assert_eq!(value.as_bytes(), b"fresh");
        assert_eq!(flight.in_flight(), 0);
    }
}

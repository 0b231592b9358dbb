//! Cache Group Orchestration
//!
//! A group is a cache namespace: it ties a local eviction cache, a request
//! coalescer, an application loader, and (optionally) peer routing into one
//! coherent `get` operation.
//!
//! # The get state machine
//!
//! ```text
//! get(key)
//!   ├── local cache hit ──────────────────────────────▶ return value
//!   └── miss → coalesced load (one flight per key)
//!         ├── peer selector names an owner
//!         │     ├── peer fetch ok → populate cache ───▶ return value
//!         │     └── peer fetch failed (logged) ─┐
//!         └── no peer ─────────────────────────┴─▶ local loader
//!                                                   ├── ok → populate cache
//!                                                   └── err → propagate
//! ```
//!
//! Peers are a routing hint, not the sole write path: every process that
//! observes a value caches it locally, independently warming each process's
//! cache. The loader is the ultimate source of truth — peer failures are
//! absorbed here and never reach the caller unless the loader also fails.

mod ports;
mod registry;

pub use ports::{Loader, LoaderFn, PeerClient, PeerSelector};
pub use registry::GroupRegistry;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use crate::cache::{CacheValue, EvictionHook, LocalCache};
use crate::error::{Error, Result};
use crate::flight::SingleFlight;
use crate::metrics;

/// Configuration for a cache group.
pub struct GroupConfig {
    /// Namespace for key-space isolation
    pub name: String,
    /// Local cache byte budget (0 = unbounded)
    pub cache_bytes: u64,
    /// Optional eviction notification hook
    pub eviction_hook: Option<EvictionHook>,
}

impl GroupConfig {
    pub fn new(name: impl Into<String>, cache_bytes: u64) -> Self {
        Self {
            name: name.into(),
            cache_bytes,
            eviction_hook: None,
        }
    }

    /// Report evictions from this group's cache to `hook`.
    pub fn with_eviction_hook(mut self, hook: EvictionHook) -> Self {
        self.eviction_hook = Some(hook);
        self
    }
}

impl std::fmt::Debug for GroupConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupConfig")
            .field("name", &self.name)
            .field("cache_bytes", &self.cache_bytes)
            .field("eviction_hook", &self.eviction_hook.is_some())
            .finish()
    }
}

/// A cache namespace combining a loader, a local cache, and peer routing.
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    cache: LocalCache,
    /// Peer selection capability, attached at most once
    peers: OnceCell<Arc<dyn PeerSelector>>,
    flight: SingleFlight,
}

impl Group {
    /// Create a group with the given namespace, cache byte budget
    /// (0 = unbounded), and loader.
    pub fn new(name: impl Into<String>, cache_bytes: u64, loader: Arc<dyn Loader>) -> Self {
        Self::with_config(GroupConfig::new(name, cache_bytes), loader)
    }

    /// Create a group from a full configuration.
    pub fn with_config(config: GroupConfig, loader: Arc<dyn Loader>) -> Self {
        let name = config.name;
        let user_hook = config.eviction_hook;

        let hook_group = name.clone();
        let hook: EvictionHook = Arc::new(move |key, value| {
            metrics::EVICTIONS.with_label_values(&[&hook_group]).inc();
            if let Some(hook) = user_hook.as_deref() {
                hook(key, value);
            }
        });

        Self {
            name,
            loader,
            cache: LocalCache::with_hook(config.cache_bytes, hook),
            peers: OnceCell::new(),
            flight: SingleFlight::new(),
        }
    }

    /// Namespace of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The group's local cache.
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Attach the peer selection capability.
    ///
    /// # Panics
    ///
    /// Panics if called more than once — swapping routing mid-flight would
    /// silently change key ownership, so a double registration is a
    /// programming defect rather than a recoverable error.
    pub fn register_peer_selector(&self, peers: Arc<dyn PeerSelector>) {
        if self.peers.set(peers).is_err() {
            panic!(
                "register_peer_selector called more than once for group {:?}",
                self.name
            );
        }
    }

    /// Fetch the value for `key`.
    ///
    /// Local hits return without touching the loader or any peer. On a miss,
    /// concurrent callers for the same key share a single load; the load
    /// consults the owning peer first (if a selector is attached) and falls
    /// back to the loader on any peer failure. Loaded values populate the
    /// local cache. Errors are never cached.
    pub async fn get(&self, key: &str) -> Result<CacheValue> {
        if key.is_empty() {
            return Err(Error::EmptyKey);
        }

        if let Some(value) = self.cache.get(key) {
            debug!(group = %self.name, key, "cache hit");
            metrics::GETS.with_label_values(&[&self.name, "hit"]).inc();
            return Ok(value);
        }

        metrics::GETS.with_label_values(&[&self.name, "miss"]).inc();
        self.flight.run(key, || self.load_uncoalesced(key)).await
    }

    /// One load attempt for `key`; runs at most once per key per instant.
    async fn load_uncoalesced(&self, key: &str) -> Result<CacheValue> {
        if let Some(peers) = self.peers.get() {
            if let Some(peer) = peers.pick_peer(key) {
                match peer.fetch(&self.name, key).await {
                    Ok(bytes) => {
                        metrics::LOADS
                            .with_label_values(&[&self.name, "peer"])
                            .inc();
                        let value = CacheValue::new(bytes);
                        self.cache.insert(key, value.clone());
                        return Ok(value);
                    }
                    Err(err) => {
                        metrics::PEER_FETCH_ERRORS
                            .with_label_values(&[&self.name])
                            .inc();
                        warn!(
                            group = %self.name,
                            key,
                            error = %err,
                            "peer fetch failed, falling back to loader"
                        );
                    }
                }
            }
        }
        self.load_locally(key).await
    }

    /// Invoke the application loader and cache its result.
    async fn load_locally(&self, key: &str) -> Result<CacheValue> {
        let bytes = self
            .loader
            .load(key)
            .await
            .map_err(|err| Error::load(key, err))?;
        metrics::LOADS
            .with_label_values(&[&self.name, "local"])
            .inc();
        let value = CacheValue::new(bytes);
        self.cache.insert(key, value.clone());
        Ok(value)
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("cache", &self.cache)
            .field("peers_registered", &self.peers.get().is_some())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    use crate::error::BoxError;

    /// Loader over a fixed table that counts invocations per key.
    struct CountingLoader {
        db: HashMap<&'static str, &'static str>,
        counts: Mutex<HashMap<String, usize>>,
    }

    impl CountingLoader {
        fn new() -> Self {
            let db = HashMap::from([
                ("Tom", "444"),
                ("Kate", "589"),
                ("Linda", "312"),
                ("Sam", "325"),
            ]);
            Self {
                db,
                counts: Mutex::new(HashMap::new()),
            }
        }

        fn count(&self, key: &str) -> usize {
            self.counts.lock().get(key).copied().unwrap_or(0)
        }

        fn total(&self) -> usize {
            self.counts.lock().values().sum()
        }
    }

    #[async_trait]
    impl Loader for CountingLoader {
        async fn load(&self, key: &str) -> std::result::Result<Bytes, BoxError> {
            *self.counts.lock().entry(key.to_owned()).or_insert(0) += 1;
            match self.db.get(key) {
                Some(value) => Ok(Bytes::copy_from_slice(value.as_bytes())),
                None => Err(format!("{key} not exist").into()),
            }
        }
    }

    struct StaticSelector {
        client: Arc<dyn PeerClient>,
    }

    impl PeerSelector for StaticSelector {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
            Some(Arc::clone(&self.client))
        }
    }

    struct StaticPeer {
        value: &'static str,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PeerClient for StaticPeer {
        async fn fetch(&self, _group: &str, _key: &str) -> std::result::Result<Bytes, BoxError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Bytes::from_static(self.value.as_bytes()))
        }
    }

    struct FailingPeer {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl PeerClient for FailingPeer {
        async fn fetch(&self, _group: &str, _key: &str) -> std::result::Result<Bytes, BoxError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Err("connection refused".into())
        }
    }

    #[tokio::test]
    async fn test_loader_fn_adapter() {
        let loader = LoaderFn::new(|key: String| async move { Ok(key.into_bytes().into()) });
        let bytes = loader.load("key").await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"key"));
    }

    #[tokio::test]
    async fn test_get_loads_once_then_hits() {
        let loader = Arc::new(CountingLoader::new());
        let group = Group::new("scores", 1 << 11, Arc::clone(&loader) as Arc<dyn Loader>);

        for (key, want) in [("Tom", "444"), ("Kate", "589"), ("Linda", "312")] {
            let value = group.get(key).await.unwrap();
            assert_eq!(value.as_bytes(), want.as_bytes());

            // A second get must be served from cache.
            let again = group.get(key).await.unwrap();
            assert_eq!(again.as_bytes(), want.as_bytes());
            assert_eq!(loader.count(key), 1, "loader re-invoked for {key}");
        }
    }

    #[tokio::test]
    async fn test_empty_key_is_rejected() {
        let loader = Arc::new(CountingLoader::new());
        let group = Group::new("scores", 0, loader);

        assert_matches!(group.get("").await, Err(Error::EmptyKey));
    }

    #[tokio::test]
    async fn test_loader_error_propagates_and_is_not_cached() {
        let loader = Arc::new(CountingLoader::new());
        let group = Group::new("scores", 0, Arc::clone(&loader) as Arc<dyn Loader>);

        assert_matches!(group.get("unknown").await, Err(Error::Load { .. }));
        assert_matches!(group.get("unknown").await, Err(Error::Load { .. }));

        // Each miss retried the loader: error outcomes are never cached.
        assert_eq!(loader.count("unknown"), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_gets_share_one_load() {
        struct SlowLoader {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl Loader for SlowLoader {
            async fn load(&self, _key: &str) -> std::result::Result<Bytes, BoxError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Bytes::from_static(b"slow"))
            }
        }

        let loader = Arc::new(SlowLoader {
            calls: AtomicUsize::new(0),
        });
        let group = Arc::new(Group::new(
            "slow",
            0,
            Arc::clone(&loader) as Arc<dyn Loader>,
        ));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let group = Arc::clone(&group);
                let barrier = Arc::clone(&barrier);
                tokio::spawn(async move {
                    barrier.wait().await;
                    group.get("hot").await
                })
            })
            .collect();

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value.as_bytes(), b"slow");
        }

        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_peer_hit_populates_local_cache() {
        let loader = Arc::new(CountingLoader::new());
        let peer = Arc::new(StaticPeer {
            value: "from-peer",
            fetches: AtomicUsize::new(0),
        });
        let group = Group::new("scores", 0, Arc::clone(&loader) as Arc<dyn Loader>);
        group.register_peer_selector(Arc::new(StaticSelector {
            client: Arc::clone(&peer) as Arc<dyn PeerClient>,
        }));

        let value = group.get("Tom").await.unwrap();
        assert_eq!(value.as_bytes(), b"from-peer");
        assert_eq!(peer.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(loader.total(), 0);

        // Second get is a local hit; the peer is not consulted again.
        let again = group.get("Tom").await.unwrap();
        assert_eq!(again.as_bytes(), b"from-peer");
        assert_eq!(peer.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_peer_failure_falls_back_to_loader() {
        let loader = Arc::new(CountingLoader::new());
        let peer = Arc::new(FailingPeer {
            fetches: AtomicUsize::new(0),
        });
        let group = Group::new("scores", 0, Arc::clone(&loader) as Arc<dyn Loader>);
        group.register_peer_selector(Arc::new(StaticSelector {
            client: Arc::clone(&peer) as Arc<dyn PeerClient>,
        }));

        let value = group.get("Tom").await.unwrap();
        assert_eq!(value.as_bytes(), b"444");
        assert_eq!(peer.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(loader.count("Tom"), 1);

        // The fallback result was cached locally.
        let again = group.get("Tom").await.unwrap();
        assert_eq!(again.as_bytes(), b"444");
        assert_eq!(loader.count("Tom"), 1);
        assert_eq!(peer.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[should_panic(expected = "register_peer_selector called more than once")]
    async fn test_double_peer_registration_panics() {
        let loader = Arc::new(CountingLoader::new());
        let peer: Arc<dyn PeerClient> = Arc::new(FailingPeer {
            fetches: AtomicUsize::new(0),
        });
        let group = Group::new("scores", 0, loader);

        group.register_peer_selector(Arc::new(StaticSelector {
            client: Arc::clone(&peer),
        }));
        group.register_peer_selector(Arc::new(StaticSelector { client: peer }));
    }

    #[tokio::test]
    async fn test_cache_budget_applies_to_group() {
        let loader = Arc::new(CountingLoader::new());
        // Budget fits two of the three-byte values with their keys, not all
        // four.
        let group = Group::new("scores", 16, Arc::clone(&loader) as Arc<dyn Loader>);

        for key in ["Tom", "Kate", "Linda", "Sam"] {
            group.get(key).await.unwrap();
        }
        assert!(group.cache().len() < 4);
        assert!(group.cache().used_bytes() <= 16);
    }
}

//! HTTP Peer Pool
//!
//! [`PeerSelector`] over a consistent-hash ring of peer base URLs. The pool
//! knows which address is "self" and excludes it from selection, so a key
//! this process owns is always handled locally.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::client::HttpPeerClient;
use super::DEFAULT_BASE_PATH;
use crate::group::{PeerClient, PeerSelector};
use crate::ring::{HashRing, RingHashFn};

/// Shared ring hash usable across peer-set rebuilds.
type SharedHashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Tunables for a peer pool.
pub struct PoolOptions {
    /// URL prefix peers serve cache traffic under
    pub base_path: String,
    /// Virtual nodes per peer on the ring (0 selects the ring default)
    pub replicas: usize,
    /// Ring hash override
    pub hash: Option<RingHashFn>,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_owned(),
            replicas: 0,
            hash: None,
        }
    }
}

impl std::fmt::Debug for PoolOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolOptions")
            .field("base_path", &self.base_path)
            .field("replicas", &self.replicas)
            .field("hash_override", &self.hash.is_some())
            .finish()
    }
}

struct PoolState {
    ring: HashRing,
    clients: HashMap<String, Arc<HttpPeerClient>>,
}

/// Consistent-hash peer selection over HTTP peers.
pub struct HttpPeerPool {
    /// This process's own peer base URL, e.g. `http://peer-a:8001`
    self_addr: String,
    base_path: String,
    replicas: usize,
    hash: Option<SharedHashFn>,
    state: RwLock<PoolState>,
}

impl HttpPeerPool {
    /// Create a pool with default options.
    pub fn new(self_addr: impl Into<String>) -> Self {
        Self::with_options(self_addr, PoolOptions::default())
    }

    pub fn with_options(self_addr: impl Into<String>, options: PoolOptions) -> Self {
        let hash: Option<SharedHashFn> = options.hash.map(Arc::from);
        let ring = build_ring(options.replicas, hash.clone());
        Self {
            self_addr: self_addr.into(),
            base_path: options.base_path,
            replicas: options.replicas,
            hash,
            state: RwLock::new(PoolState {
                ring,
                clients: HashMap::new(),
            }),
        }
    }

    /// Replace the peer set (self included), rebuilding the ring and the
    /// per-peer clients.
    pub fn set_peers<I, S>(&self, peers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let peers: Vec<String> = peers.into_iter().map(Into::into).collect();

        let mut ring = self.make_ring();
        ring.add_nodes(peers.iter().cloned());

        let clients = peers
            .into_iter()
            .map(|peer| {
                let client = Arc::new(HttpPeerClient::new(format!("{peer}{}", self.base_path)));
                (peer, client)
            })
            .collect();

        *self.state.write() = PoolState { ring, clients };
    }

    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    fn make_ring(&self) -> HashRing {
        build_ring(self.replicas, self.hash.clone())
    }
}

fn build_ring(replicas: usize, hash: Option<SharedHashFn>) -> HashRing {
    let hash = hash.map(|hash| Box::new(move |data: &[u8]| (*hash)(data)) as RingHashFn);
    HashRing::with_options(replicas, hash)
}

impl PeerSelector for HttpPeerPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>> {
        let state = self.state.read();
        let owner = state.ring.owner(key)?;
        if owner == self.self_addr {
            return None;
        }
        debug!(peer = owner, key, "picked peer");
        state
            .clients
            .get(owner)
            .cloned()
            .map(|client| client as Arc<dyn PeerClient>)
    }
}

impl std::fmt::Debug for HttpPeerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("HttpPeerPool")
            .field("self_addr", &self.self_addr)
            .field("base_path", &self.base_path)
            .field("peers", &state.clients.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

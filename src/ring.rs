//! Consistent Hash Ring
//!
//! Maps arbitrary keys to one of a set of registered node identifiers using
//! virtual replication on a hash ring. Each real node occupies `replicas`
//! virtual positions, which smooths load distribution across a small node
//! set; because node placement and key lookup use the same deterministic
//! hash, a key's owner is stable across process restarts for an unchanged
//! node set and replica count.
//!
//! The hash is pluggable. The default is a 32-bit CRC checksum — dispersion
//! is what matters here, not cryptographic strength.

use std::collections::HashMap;

/// Pluggable ring hash function.
pub type RingHashFn = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Default number of virtual nodes per real node.
pub const DEFAULT_REPLICAS: usize = 50;

/// Consistent-hash ring with virtual replication.
///
/// Add-only: nodes are registered once per peer-set configuration; there is
/// no node removal.
pub struct HashRing {
    /// Virtual nodes per real node
    replicas: usize,
    /// Hash function for node placement and key lookup
    hash: RingHashFn,
    /// Sorted virtual node positions
    ring: Vec<u32>,
    /// Virtual position → owning node id
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Create a ring with the default replica count and hash.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_REPLICAS, None)
    }

    /// Create a ring with a custom replica count (0 selects the default) and
    /// an optional hash override.
    pub fn with_options(replicas: usize, hash: Option<RingHashFn>) -> Self {
        let replicas = if replicas == 0 {
            DEFAULT_REPLICAS
        } else {
            replicas
        };
        Self {
            replicas,
            hash: hash.unwrap_or_else(|| Box::new(crc32fast::hash)),
            ring: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Register nodes on the ring.
    ///
    /// Every node gets `replicas` virtual positions hashed from the replica
    /// index concatenated with the node id. The ring is sorted once per
    /// batch, not per insertion.
    pub fn add_nodes<I, S>(&mut self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for node in nodes {
            let node = node.into();
            for replica in 0..self.replicas {
                let position = (self.hash)(format!("{replica}{node}").as_bytes());
                self.ring.push(position);
                self.owners.insert(position, node.clone());
            }
        }
        self.ring.sort_unstable();
    }

    /// Node id owning `key`, or `None` if the ring is empty.
    ///
    /// Finds the first virtual position at or after the key's hash, wrapping
    /// to the start of the ring past the end. An empty ring is not an error:
    /// callers treat it as "handle locally."
    pub fn owner(&self, key: &str) -> Option<&str> {
        if self.ring.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        let idx = self.ring.partition_point(|&position| position < hash);
        let position = self.ring[idx % self.ring.len()];
        self.owners.get(&position).map(String::as_str)
    }

    /// Number of virtual positions on the ring.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// True if no nodes are registered.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl Default for HashRing {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HashRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("virtual_nodes", &self.ring.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

//! meshcache — Distributed Peer-Replicated Read-Through Cache
//!
//! A process-local bounded cache backed by a pluggable data loader, where
//! cooperating processes partition key ownership over a consistent-hash ring
//! and satisfy misses by asking the owning peer before falling back to the
//! loader. Within one process, concurrent misses for the same key coalesce
//! into a single load.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Group::get(key)                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  LocalCache (LRU,      │  SingleFlight     │  HttpPeerPool       │
//! │  byte-budgeted)        │  (per-key load    │  (HashRing routing  │
//! │  ┌─────────────────┐   │   coalescing)     │   to peer clients)  │
//! │  │ hit ──▶ return  │   │                   │                     │
//! │  └─────────────────┘   │                   │                     │
//! │        miss ───────────▶ one flight ───────▶ owner? ──▶ fetch    │
//! │                                            │  none/failed        │
//! │                                            ▼                     │
//! │                                      Loader (app data source)    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Best-effort single-owner routing only: there is no replication guarantee,
//! no cross-peer consistency, and no distributed invalidation. Every process
//! that observes a value caches it locally and evicts independently.
//!
//! # Modules
//!
//! - [`cache`] - Value container, byte-budgeted LRU, and its locked owner
//! - [`error`] - Error types
//! - [`flight`] - Per-key request coalescing
//! - [`group`] - The get orchestration, capability ports, group registry
//! - [`metrics`] - Prometheus metrics
//! - [`ring`] - Consistent-hash ring
//! - [`transport`] - HTTP peer pool, client, and server

pub mod cache;
pub mod error;
pub mod flight;
pub mod group;
pub mod metrics;
pub mod ring;
pub mod transport;

// Re-export commonly used types
pub use cache::{CacheValue, EvictionHook, LocalCache, LruCache};
pub use error::{BoxError, Error, Result};
pub use flight::SingleFlight;
pub use group::{Group, GroupConfig, GroupRegistry, Loader, LoaderFn, PeerClient, PeerSelector};
pub use ring::{HashRing, RingHashFn, DEFAULT_REPLICAS};
pub use transport::{HttpPeerClient, HttpPeerPool, PeerServer, PoolOptions, DEFAULT_BASE_PATH};

//! HTTP Peer Transport
//!
//! The wire boundary between cooperating cache processes. Each process runs
//! a [`PeerServer`] answering `GET {base_path}{group}/{key}` with raw value
//! bytes, and holds an [`HttpPeerPool`] that routes keys to whichever peer
//! owns them on the consistent-hash ring, speaking to each peer through an
//! [`HttpPeerClient`].
//!
//! ```text
//! Group::get ──miss──▶ HttpPeerPool::pick_peer ──▶ HttpPeerClient::fetch
//!                                                        │ HTTP GET
//!                                                        ▼
//!                                      peer process: PeerServer ──▶ Group::get
//! ```

mod client;
mod pool;
mod server;

pub use client::HttpPeerClient;
pub use pool::{HttpPeerPool, PoolOptions};
pub use server::PeerServer;

/// Default URL prefix peers serve cache traffic under.
pub const DEFAULT_BASE_PATH: &str = "/_meshcache/";

//! Group Capability Ports
//!
//! The contracts a cache group depends on. Each is a single-method trait so
//! applications and transports plug in without inheriting anything beyond
//! the one capability they provide: a [`Loader`] is the authoritative data
//! source behind the cache, a [`PeerSelector`] names the process that owns a
//! key, and a [`PeerClient`] fetches a value from one such process.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::BoxError;

/// Application data source consulted on a cache miss.
///
/// Errors propagate verbatim to the caller of `Group::get` and are never
/// cached; the next miss for the key retries the load.
#[async_trait]
pub trait Loader: Send + Sync {
    async fn load(&self, key: &str) -> Result<Bytes, BoxError>;
}

/// Strategy returning the remote owner (if any) of a key.
///
/// Pure selection, no I/O. `None` means "no remote peer / this process is
/// the owner" — the caller handles the key locally.
pub trait PeerSelector: Send + Sync {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>>;
}

/// Client for one remote peer.
///
/// Any non-success response or transport failure is an error, never a
/// partial value.
#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn fetch(&self, group: &str, key: &str) -> Result<Bytes, BoxError>;
}

/// Adapter implementing [`Loader`] from an async closure.
///
/// ```
/// use meshcache::group::LoaderFn;
///
/// let loader = LoaderFn::new(|key: String| async move {
///     Ok(key.into_bytes().into())
/// });
/// ```
pub struct LoaderFn<F> {
    f: F,
}

impl<F, Fut> LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes, BoxError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Loader for LoaderFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Bytes, BoxError>> + Send,
{
    async fn load(&self, key: &str) -> Result<Bytes, BoxError> {
        (self.f)(key.to_owned()).await
    }
}

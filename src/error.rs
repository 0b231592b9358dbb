//! Error types for meshcache

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type used at the capability boundaries (loader, peer client).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in meshcache.
///
/// The enum is `Clone` because a coalesced load delivers one outcome to every
/// waiter; foreign errors are carried behind an `Arc` so the original error
/// survives the fan-out intact.
///
/// Peer-transport failures never appear here: they are absorbed inside the
/// group orchestration (logged, then the local loader takes over). Misuse such
/// as registering a peer selector twice is a panic, not an `Error` — it is a
/// programming defect, not a runtime condition.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Cache key was empty
    #[error("cache key must not be empty")]
    EmptyKey,

    /// The application loader failed for a key
    #[error("load failed for key {key:?}: {cause}")]
    Load { key: String, cause: Arc<BoxError> },

    /// No group registered under the requested name
    #[error("no such group: {0}")]
    GroupNotFound(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),
}

impl Error {
    /// Wrap a loader failure, preserving the original error.
    pub fn load(key: impl Into<String>, cause: BoxError) -> Self {
        Self::Load {
            key: key.into(),
            cause: Arc::new(cause),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

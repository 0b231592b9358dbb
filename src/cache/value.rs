//! Cache Value Container
//!
//! An immutable byte-sequence wrapper used as the cache's value type. Once
//! constructed a value is never mutated; cloning shares the underlying buffer
//! instead of copying it, which keeps cache-internal storage and caller-held
//! handles from ever aliasing mutable data.

use bytes::Bytes;

/// Immutable byte-sequence cache value.
///
/// Backed by [`Bytes`], so clones are refcount bumps and the payload itself
/// can never change underneath the cache. Callers that need detached owned
/// data use [`to_vec`](Self::to_vec).
#[derive(Clone, PartialEq, Eq)]
pub struct CacheValue {
    bytes: Bytes,
}

impl CacheValue {
    /// Create a new value from anything convertible to [`Bytes`].
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Detached copy of the payload.
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.to_vec()
    }

    /// Consume the value, yielding the shared buffer.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl From<Bytes> for CacheValue {
    fn from(bytes: Bytes) -> Self {
        Self { bytes }
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&'static str> for CacheValue {
    fn from(s: &'static str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl AsRef<[u8]> for CacheValue {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for CacheValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheValue")
            .field("len", &self.bytes.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

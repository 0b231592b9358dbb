//! Process-Local Cache
//!
//! The byte-budgeted eviction cache and its value container.
//!
//! [`LruCache`] is the unsynchronized core structure; [`LocalCache`] is the
//! concurrent owner that every group holds. The lock inside [`LocalCache`] is
//! held only for the duration of a single map operation — never across I/O,
//! and never while eviction hooks run.

mod lru;
mod value;

use parking_lot::Mutex;
use std::sync::Arc;

pub use lru::LruCache;
pub use value::CacheValue;

/// Eviction notification hook.
///
/// Invoked once per evicted entry with an owned snapshot of the key and
/// value, strictly **after** the cache's internal lock has been released, so
/// a hook is free to call back into the same cache without deadlocking.
pub type EvictionHook = Arc<dyn Fn(String, CacheValue) + Send + Sync>;

/// Thread-safe wrapper around [`LruCache`].
pub struct LocalCache {
    inner: Mutex<LruCache>,
    hook: Option<EvictionHook>,
}

impl LocalCache {
    /// Create a cache with the given byte budget (0 = unbounded).
    pub fn new(max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(max_bytes)),
            hook: None,
        }
    }

    /// Create a cache that reports evictions to `hook`.
    pub fn with_hook(max_bytes: u64, hook: EvictionHook) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(max_bytes)),
            hook: Some(hook),
        }
    }

    /// Look up a key, promoting it on a hit.
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        self.inner.lock().get(key)
    }

    /// Insert or update an entry, enforcing the byte budget.
    ///
    /// Eviction hooks run after the lock is released, in least-recently-used
    /// order.
    pub fn insert(&self, key: impl Into<String>, value: CacheValue) {
        let evicted = self.inner.lock().insert(key, value);
        if let Some(hook) = self.hook.as_deref() {
            for (key, value) in evicted {
                hook(key, value);
            }
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Current used bytes.
    pub fn used_bytes(&self) -> u64 {
        self.inner.lock().used_bytes()
    }
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("LocalCache")
            .field("entries", &inner.len())
            .field("used_bytes", &inner.used_bytes())
            .field("max_bytes", &inner.max_bytes())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

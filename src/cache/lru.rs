//! Byte-Budgeted LRU Cache
//!
//! Recency-ordered key/value store with least-recently-used eviction driven by
//! a byte budget rather than an entry count. The logical size of an entry is
//! the byte length of its key plus the byte length of its value.
//!
//! # Structure
//!
//! A slab-allocated doubly-linked recency list (most-recently-used at the
//! head) plus a hash index from key to slab slot, giving O(1) lookup,
//! promotion, and eviction.
//!
//! # Ownership
//!
//! This structure is not internally synchronized; concurrent access is
//! mediated by its owner ([`LocalCache`](super::LocalCache)). Entries evicted
//! while enforcing the budget are returned to the caller rather than dropped,
//! so the owner can run eviction hooks outside its lock.

use std::collections::HashMap;

use super::value::CacheValue;

/// Sentinel slot index for "no node".
const NIL: usize = usize::MAX;

struct Node {
    key: String,
    value: CacheValue,
    prev: usize,
    next: usize,
}

/// Byte-size-bounded, recency-ordered cache.
///
/// A budget of `0` means unbounded. After any mutating operation returns, the
/// used byte count never exceeds a nonzero budget (eviction runs synchronously
/// inside [`insert`](Self::insert) until the invariant holds or the cache is
/// empty — possibly evicting the entry that was just inserted).
pub struct LruCache {
    /// Maximum byte budget (0 = unbounded)
    max_bytes: u64,
    /// Current used bytes (sum of live entry sizes)
    used_bytes: u64,
    /// Slab of nodes; freed slots are recycled
    slots: Vec<Option<Node>>,
    /// Recycled slot indices
    free: Vec<usize>,
    /// Most-recently-used slot
    head: usize,
    /// Least-recently-used slot
    tail: usize,
    /// Key → slab slot
    index: HashMap<String, usize>,
}

impl LruCache {
    /// Create a cache with the given byte budget (0 = unbounded).
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            used_bytes: 0,
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            index: HashMap::new(),
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Current used bytes.
    pub fn used_bytes(&self) -> u64 {
        self.used_bytes
    }

    /// Configured byte budget (0 = unbounded).
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Look up a key, promoting it to most-recently-used on a hit.
    ///
    /// A miss has no side effect.
    pub fn get(&mut self, key: &str) -> Option<CacheValue> {
        let slot = *self.index.get(key)?;
        self.move_to_front(slot);
        self.slots[slot].as_ref().map(|node| node.value.clone())
    }

    /// Insert or update an entry, then enforce the byte budget.
    ///
    /// An update adjusts the used byte count by the size difference between
    /// the old and new value and promotes the entry; a fresh insert lands at
    /// the most-recent position. Entries evicted to restore the budget are
    /// returned in least-recently-used order.
    pub fn insert(&mut self, key: impl Into<String>, value: CacheValue) -> Vec<(String, CacheValue)> {
        let key = key.into();
        match self.index.get(&key).copied() {
            Some(slot) => {
                let node = self.slots[slot].as_mut().expect("indexed slot is live");
                let old_len = node.value.len() as u64;
                let new_len = value.len() as u64;
                node.value = value;
                self.used_bytes -= old_len;
                self.used_bytes += new_len;
                self.move_to_front(slot);
            }
            None => {
                let size = entry_size(&key, &value);
                let slot = self.alloc(Node {
                    key: key.clone(),
                    value,
                    prev: NIL,
                    next: NIL,
                });
                self.index.insert(key, slot);
                self.push_front(slot);
                self.used_bytes += size;
            }
        }
        self.evict_over_budget()
    }

    /// Pop the least-recently-used entry, if any.
    pub fn pop_lru(&mut self) -> Option<(String, CacheValue)> {
        let slot = self.tail;
        if slot == NIL {
            return None;
        }
        self.unlink(slot);
        let node = self.slots[slot].take().expect("tail slot is live");
        self.free.push(slot);
        self.index.remove(&node.key);
        self.used_bytes -= entry_size(&node.key, &node.value);
        Some((node.key, node.value))
    }

    /// Evict from the least-recent end until the budget holds or the cache is
    /// empty.
    fn evict_over_budget(&mut self) -> Vec<(String, CacheValue)> {
        let mut evicted = Vec::new();
        while self.max_bytes != 0 && self.used_bytes > self.max_bytes {
            match self.pop_lru() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }

    fn alloc(&mut self, node: Node) -> usize {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(node);
                slot
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Link an unlinked node at the most-recent position.
    fn push_front(&mut self, slot: usize) {
        {
            let node = self.slots[slot].as_mut().expect("slot is live");
            node.prev = NIL;
            node.next = self.head;
        }
        if self.head != NIL {
            self.slots[self.head].as_mut().expect("head slot is live").prev = slot;
        }
        self.head = slot;
        if self.tail == NIL {
            self.tail = slot;
        }
    }

    /// Detach a node from the recency list, patching its neighbors.
    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.slots[slot].as_ref().expect("slot is live");
            (node.prev, node.next)
        };
        if prev != NIL {
            self.slots[prev].as_mut().expect("prev slot is live").next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].as_mut().expect("next slot is live").prev = prev;
        } else {
            self.tail = prev;
        }
        let node = self.slots[slot].as_mut().expect("slot is live");
        node.prev = NIL;
        node.next = NIL;
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == slot {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }
}

impl std::fmt::Debug for LruCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("max_bytes", &self.max_bytes)
            .field("used_bytes", &self.used_bytes)
            .field("entries", &self.index.len())
            .finish()
    }
}

/// Logical size of an entry: key bytes + value bytes.
fn entry_size(key: &str, value: &CacheValue) -> u64 {
    (key.len() + value.len()) as u64
}

// =============================================================================
// Tests
// =============================================================================

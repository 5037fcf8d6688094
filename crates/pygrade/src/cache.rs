//! Compiled-code cache: an LRU cache keyed by SHA-256 hashes of Python source.
//!
//! Grading re-executes near-identical snippets many times — the same candidate
//! function is combined with every test, and diagnosis recompiles the function
//! on its own. Each environment worker keeps a [`CodeCache`] of compiled code
//! objects so identical source strings are compiled once per interpreter.
//!
//! # Thread safety
//!
//! Unlike a process-global cache, a `CodeCache` lives on a single worker
//! thread for the lifetime of one interpreter (code objects are not `Send`
//! and are invalid in any other interpreter), so no lock is needed. When a
//! worker is abandoned after a timeout its cache goes with it.

use std::num::NonZeroUsize;

use lru::LruCache;
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest used as a cache key.
pub type CacheKey = [u8; 32];

/// Compute the SHA-256 hash of `source` bytes and return it as a [`CacheKey`].
///
/// The same input always produces the same 32-byte output; different inputs
/// produce distinct outputs with overwhelming probability.
pub fn cache_key(source: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.finalize().into()
}

/// LRU cache mapping [`CacheKey`] → a compiled artifact `V`.
///
/// Generic over the value type so the cache itself stays independent of the
/// VM; the environment worker instantiates it with interpreter code objects.
pub struct CodeCache<V> {
    inner: LruCache<CacheKey, V>,
    capacity: usize,
}

impl<V: Clone> CodeCache<V> {
    /// Create a new [`CodeCache`] with the given maximum number of entries.
    ///
    /// `capacity` is clamped to a minimum of `1`; passing `0` is safe and will
    /// behave as though `capacity == 1`.
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).expect("capacity >= 1");
        Self {
            inner: LruCache::new(cap),
            capacity: capacity.max(1),
        }
    }

    /// Look up `key` in the cache.
    ///
    /// Returns `Some(value)` on a hit and advances the entry to the
    /// most-recently-used position; returns `None` on a miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        self.inner.get(key).cloned()
    }

    /// Insert `key` → `value` into the cache.
    ///
    /// If the cache is already at capacity the least-recently-used entry is
    /// evicted to make room.
    pub fn insert(&mut self, key: CacheKey, value: V) {
        self.inner.put(key, value);
    }

    /// Return the number of entries currently in the cache.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Return `true` if the cache contains no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Return the maximum number of entries the cache can hold before eviction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ─── Unit tests ────────────────────────────────────────────────────────────────

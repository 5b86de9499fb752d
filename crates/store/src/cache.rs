//! Shared LRU cache for nodes read back from disk
//!
//! One cache instance can back any number of history files; entries are
//! keyed by (file id, sequence number) so trees never see each other's
//! nodes. The cache is handed to each tree at construction, which keeps
//! cache sizing a caller decision instead of process-global state.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use crate::node::Node;

/// Default number of cached nodes.
pub const DEFAULT_CACHE_CAPACITY: usize = 230;

type CacheKey = (u64, i32);

/// Bounded LRU cache of deserialized nodes, shared between trees.
#[derive(Debug)]
pub struct NodeCache {
    inner: Mutex<LruCache<CacheKey, Arc<Node>>>,
}

impl NodeCache {
    /// Create a cache holding at most `capacity` nodes.
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a node, refreshing its recency on a hit.
    pub fn get(&self, file_id: u64, seq: i32) -> Option<Arc<Node>> {
        self.inner.lock().get(&(file_id, seq)).cloned()
    }

    /// Insert or refresh a node, evicting the least recently used entry
    /// when full.
    pub fn insert(&self, file_id: u64, seq: i32, node: Arc<Node>) {
        self.inner.lock().put((file_id, seq), node);
    }

    /// Drop every entry belonging to `file_id`. Called when a file is
    /// deleted or truncated so stale blocks cannot be served.
    pub fn purge_file(&self, file_id: u64) {
        let mut cache = self.inner.lock();
        let stale: Vec<CacheKey> = cache
            .iter()
            .filter(|((f, _), _)| *f == file_id)
            .map(|(k, _)| *k)
            .collect();
        for key in stale {
            cache.pop(&key);
        }
    }

    /// Number of nodes currently cached.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl Default for NodeCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).expect("capacity is non-zero"))
    }
}

//! Reference-counted resource cache.
//!
//! [`ResourceCache`] is the shared base of the page cache, the data item
//! cache and the version entry cache. It provides:
//! - Reference counting (`get` increments, `release` decrements)
//! - Eviction on last release, through a pluggable [`CacheSource`]
//! - Deduplicated loading when several threads miss on the same key

use std::collections::{HashMap, HashSet};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cache::CacheStats;
use crate::common::{Error, Result};

/// How long a caller sleeps while another caller loads the same key.
const LOAD_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Where a [`ResourceCache`] gets its resources from and where it writes
/// them back.
pub trait CacheSource: Send + Sync {
    /// The cached resource. Usually an `Arc` so handing out copies is cheap.
    type Item: Clone + Send + Sync;

    /// Materialize the resource for `key`. Runs outside the cache lock.
    fn load(&self, key: u64) -> Result<Self::Item>;

    /// Write back / release a resource whose reference count reached zero.
    fn evict(&self, key: u64, item: Self::Item) -> Result<()>;
}

/// Everything guarded by the cache mutex.
struct CacheState<T> {
    items: HashMap<u64, T>,
    refs: HashMap<u64, usize>,
    /// Keys some caller is loading right now.
    loading: HashSet<u64>,
    /// Resident plus in-flight resources.
    count: usize,
}

/// A reference-counted cache keyed by `u64`.
///
/// # Thread Safety
/// - `state`: one `Mutex` for the item, refcount and in-flight maps
/// - `source.load`: runs outside the lock; other callers asking for the same
///   key sleep-retry until it finishes
/// - `source.evict`: runs under the lock, so a concurrent `get` can never
///   reload a resource before it has been written back
/// - `stats`: no lock, atomic counters
///
/// # Usage
/// ```ignore
/// let page = cache.get(pgno)?;   // refcount 1 (loads on miss)
/// // ... use page ...
/// cache.release(pgno)?;          // refcount 0 -> evicted
/// ```
pub struct ResourceCache<S: CacheSource> {
    source: S,
    state: Mutex<CacheState<S::Item>>,
    /// Maximum resident resources, 0 = unbounded.
    capacity: usize,
    stats: CacheStats,
}

impl<S: CacheSource> ResourceCache<S> {
    /// Create a cache holding at most `capacity` resources (0 = unbounded).
    pub fn new(source: S, capacity: usize) -> Self {
        Self {
            source,
            state: Mutex::new(CacheState {
                items: HashMap::new(),
                refs: HashMap::new(),
                loading: HashSet::new(),
                count: 0,
            }),
            capacity,
            stats: CacheStats::new(),
        }
    }

    /// Get the resource for `key`, loading it on a miss.
    ///
    /// Every successful `get` must be paired with a [`release`](Self::release).
    ///
    /// # Errors
    /// - `Error::CacheFull` if the key is not resident and the cache is at capacity
    /// - Whatever the source's `load` returns
    pub fn get(&self, key: u64) -> Result<S::Item> {
        loop {
            let mut state = self.state.lock();

            if state.loading.contains(&key) {
                drop(state);
                self.stats.load_waits.fetch_add(1, Ordering::Relaxed);
                thread::sleep(LOAD_RETRY_INTERVAL);
                continue;
            }

            if let Some(item) = state.items.get(&key).cloned() {
                *state.refs.entry(key).or_insert(0) += 1;
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(item);
            }

            if self.capacity > 0 && state.count >= self.capacity {
                return Err(Error::CacheFull {
                    capacity: self.capacity,
                });
            }

            state.count += 1;
            state.loading.insert(key);
            break;
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);

        // Slow path: I/O happens without the lock
        let loaded = self.source.load(key);

        let mut state = self.state.lock();
        state.loading.remove(&key);
        match loaded {
            Ok(item) => {
                state.items.insert(key, item.clone());
                state.refs.insert(key, 1);
                Ok(item)
            }
            Err(e) => {
                state.count -= 1;
                Err(e)
            }
        }
    }

    /// Drop one reference to `key`, evicting the resource at zero.
    ///
    /// # Errors
    /// - `Error::ResourceNotHeld` if nobody holds `key`
    /// - Whatever the source's `evict` returns (the entry is removed regardless)
    pub fn release(&self, key: u64) -> Result<()> {
        let mut state = self.state.lock();

        let remaining = match state.refs.get_mut(&key) {
            Some(refs) => {
                *refs -= 1;
                *refs
            }
            None => return Err(Error::ResourceNotHeld(key)),
        };

        if remaining > 0 {
            return Ok(());
        }

        state.refs.remove(&key);
        state.count -= 1;
        match state.items.remove(&key) {
            Some(item) => {
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                self.source.evict(key, item)
            }
            None => Ok(()),
        }
    }

    /// Evict every resident resource regardless of reference counts.
    ///
    /// All resources are evicted even if one eviction fails; the first
    /// error is returned.
    pub fn close(&self) -> Result<()> {
        let mut state = self.state.lock();

        let items: Vec<(u64, S::Item)> = state.items.drain().collect();
        state.refs.clear();
        state.count = state.loading.len();

        let mut first_err = None;
        for (key, item) in items {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = self.source.evict(key, item) {
                first_err.get_or_insert(e);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Current reference count of `key`, or `None` if it is not resident.
    pub fn ref_count(&self, key: u64) -> Option<usize> {
        self.state.lock().refs.get(&key).copied()
    }

    /// Number of resident resources.
    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Whether no resource is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum resident resources, 0 = unbounded.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// The loader/evictor this cache wraps.
    pub fn source(&self) -> &S {
        &self.source
    }
}

//! RAM page cache with memory-aware LRU eviction
//!
//! Provides in-memory caching of rendered pages. Every entry is accounted by
//! its pixel byte length, and least recently used pages are evicted whenever
//! an insertion would push the total over the configured memory budget.

use crate::key::{DocumentId, PageKey, RenderedPage};
use lru::LruCache;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Statistics about cache usage
///
/// Counters are cumulative since the cache was created. There is no reset;
/// callers that want rates over an interval should snapshot and diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of pages currently in cache
    pub entry_count: usize,

    /// Total bytes used by cached pages
    pub current_bytes: usize,

    /// Memory budget in bytes
    pub budget_bytes: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of pages evicted due to memory pressure
    pub evictions: u64,

    /// Number of inserts that alone exceeded the whole budget
    pub oversized_inserts: u64,
}

impl CacheStats {
    /// Calculate cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate memory utilization (0.0 to 1.0, above 1.0 for an oversized sole entry)
    pub fn utilization(&self) -> f64 {
        if self.budget_bytes == 0 {
            0.0
        } else {
            self.current_bytes as f64 / self.budget_bytes as f64
        }
    }
}

/// Internal cache state
struct CacheState {
    /// Pages in recency order (most recently used first)
    entries: LruCache<PageKey, Arc<RenderedPage>>,

    /// Current memory usage in bytes
    current_bytes: usize,

    /// Memory budget in bytes
    budget_bytes: usize,

    hits: u64,
    misses: u64,
    evictions: u64,
    oversized_inserts: u64,
}

impl CacheState {
    fn new(budget_bytes: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            current_bytes: 0,
            budget_bytes,
            hits: 0,
            misses: 0,
            evictions: 0,
            oversized_inserts: 0,
        }
    }

    /// Evict the least recently used page
    fn evict_lru(&mut self) -> Option<Arc<RenderedPage>> {
        let (key, page) = self.entries.pop_lru()?;
        self.current_bytes = self.current_bytes.saturating_sub(page.byte_size());
        self.evictions += 1;
        log::trace!("evicted {key} ({} bytes)", page.byte_size());
        Some(page)
    }

    /// Evict pages until `required_size` more bytes fit in the budget
    fn evict_to_fit(&mut self, required_size: usize) {
        while self.current_bytes + required_size > self.budget_bytes {
            if self.evict_lru().is_none() {
                break;
            }
        }
    }

    fn remove(&mut self, key: &PageKey) -> Option<Arc<RenderedPage>> {
        let page = self.entries.pop(key)?;
        self.current_bytes = self.current_bytes.saturating_sub(page.byte_size());
        Some(page)
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len(),
            current_bytes: self.current_bytes,
            budget_bytes: self.budget_bytes,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            oversized_inserts: self.oversized_inserts,
        }
    }
}

/// RAM page cache with memory-aware LRU eviction
///
/// Thread-safe in-memory cache for rendered pages. `get` and `put` both count
/// as an access. When an insertion would exceed the memory budget, least
/// recently used pages are evicted until the new page fits; the page being
/// inserted is never an eviction candidate.
///
/// # Example
///
/// ```
/// use stave_cache::{PageCache, PageKey, RenderedPage};
///
/// // Create a cache with a 100MB budget
/// let cache = PageCache::with_mb_budget(100);
///
/// // Store a page
/// let key = PageKey::new(1, 1, 1.0);
/// cache.put(key, RenderedPage::new(key, 256, 256, vec![0u8; 256 * 256 * 4]));
///
/// // Retrieve a page
/// if let Some(page) = cache.get(&key) {
///     println!("Cache hit! Page size: {}x{}", page.width, page.height);
/// }
///
/// let stats = cache.stats();
/// println!("Hit rate: {:.2}%", stats.hit_rate() * 100.0);
/// println!("Memory used: {} / {} bytes", stats.current_bytes, stats.budget_bytes);
/// ```
pub struct PageCache {
    state: Mutex<CacheState>,
}

impl PageCache {
    /// Create a new page cache with the given memory budget in bytes
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            state: Mutex::new(CacheState::new(budget_bytes)),
        }
    }

    /// Create a new page cache with a memory budget in megabytes
    pub fn with_mb_budget(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a page in the cache, replacing any page under the same key
    ///
    /// If storing this page would exceed the budget, least recently used
    /// pages are evicted until there is enough space. A page larger than the
    /// whole budget is still stored, as the sole occupant of the cache.
    pub fn put(&self, key: PageKey, page: RenderedPage) -> Arc<RenderedPage> {
        self.put_shared(key, Arc::new(page))
    }

    /// Store an already shared page in the cache
    pub fn put_shared(&self, key: PageKey, page: Arc<RenderedPage>) -> Arc<RenderedPage> {
        let mut state = self.lock();
        let size = page.byte_size();

        state.remove(&key);

        if size > state.budget_bytes {
            state.oversized_inserts += 1;
            log::warn!(
                "{key} needs {size} bytes, more than the whole cache budget of {} bytes",
                state.budget_bytes
            );
        }
        state.evict_to_fit(size);

        state.current_bytes += size;
        state.entries.put(key, Arc::clone(&page));
        page
    }

    /// Retrieve a page from the cache
    ///
    /// A hit marks the page as most recently used. Hits and misses are counted.
    pub fn get(&self, key: &PageKey) -> Option<Arc<RenderedPage>> {
        let mut state = self.lock();

        match state.entries.get(key).cloned() {
            Some(page) => {
                state.hits += 1;
                Some(page)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Look up a page without updating recency or statistics
    pub fn peek(&self, key: &PageKey) -> Option<Arc<RenderedPage>> {
        self.lock().entries.peek(key).cloned()
    }

    /// Check if a page is cached without updating recency or statistics
    pub fn contains(&self, key: &PageKey) -> bool {
        self.lock().entries.contains(key)
    }

    /// Remove a single page from the cache
    pub fn remove(&self, key: &PageKey) -> Option<Arc<RenderedPage>> {
        self.lock().remove(key)
    }

    /// Remove every page that belongs to `document`
    ///
    /// Returns the number of pages removed.
    pub fn invalidate(&self, document: DocumentId) -> usize {
        let mut state = self.lock();

        let doomed: Vec<PageKey> = state
            .entries
            .iter()
            .filter(|(key, _)| key.document == document)
            .map(|(key, _)| *key)
            .collect();

        for key in &doomed {
            state.remove(key);
        }

        doomed.len()
    }

    /// Clear all pages from the cache
    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.current_bytes = 0;
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    /// Change the memory budget
    ///
    /// If the new budget is smaller than current usage, pages are evicted
    /// until usage fits.
    pub fn set_budget(&self, budget_bytes: usize) {
        let mut state = self.lock();
        state.budget_bytes = budget_bytes;
        state.evict_to_fit(0);
    }

    /// Get the memory budget in bytes
    pub fn budget_bytes(&self) -> usize {
        self.lock().budget_bytes
    }

    /// Get the current memory usage in bytes
    pub fn current_bytes(&self) -> usize {
        self.lock().current_bytes
    }

    /// Get the number of pages currently in the cache
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Check if the cache holds no pages
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Keys in eviction order, least recently used first
    pub fn keys_lru_first(&self) -> Vec<PageKey> {
        let state = self.lock();
        state.entries.iter().rev().map(|(key, _)| *key).collect()
    }
}

impl Default for PageCache {
    /// Create a cache with a default 100MB budget
    fn default() -> Self {
        Self::with_mb_budget(100)
    }
}

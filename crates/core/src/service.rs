//! Rendering service
//!
//! The one entry point a viewer talks to. Wires the page cache, document
//! store, scheduler and preloader together for a single viewer session.

use crate::config::EngineConfig;
use crate::preload::{Preloader, ViewMode};
use serde::Serialize;
use stave_cache::{DocumentId, PageCache, PageKey, RenderedPage};
use stave_render::{validate_scale, DocumentHandle, DocumentStore, PageDecoder, RenderResult};
use stave_scheduler::{RenderPriority, RenderScheduler, SchedulerConfig};
use std::sync::Arc;
use tokio::runtime::Handle;

/// Snapshot of engine health for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineMetrics {
    /// Cache hits over all lookups, 0 before the first lookup
    pub hit_rate: f64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Pages larger than the whole budget that were cached alone anyway
    pub oversized_inserts: u64,
    pub current_bytes: usize,
    pub budget_bytes: usize,
    pub entry_count: usize,
    /// Mean wall time of a completed render
    pub avg_render_ms: f64,
    pub queued_jobs: usize,
    pub in_flight_jobs: usize,
}

/// Page rendering service for one viewer session
///
/// Owns its cache and scheduler outright; two services never share state.
pub struct RenderingService {
    config: EngineConfig,
    cache: Arc<PageCache>,
    store: Arc<DocumentStore>,
    scheduler: RenderScheduler,
    preloader: Preloader,
}

impl RenderingService {
    /// Create a service whose renders run on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime; use
    /// [`RenderingService::with_runtime`] to pass a handle explicitly.
    pub fn new(decoder: Arc<dyn PageDecoder>, config: EngineConfig) -> Self {
        Self::with_runtime(decoder, config, Handle::current())
    }

    pub fn with_runtime(decoder: Arc<dyn PageDecoder>, config: EngineConfig, runtime: Handle) -> Self {
        let cache = Arc::new(PageCache::new(config.memory_budget_bytes));
        let store = Arc::new(DocumentStore::new(decoder));
        let scheduler = RenderScheduler::new(
            Arc::clone(&cache),
            Arc::clone(&store),
            SchedulerConfig {
                max_concurrent_renders: config.max_concurrent_renders,
                render_timeout: config.render_timeout(),
            },
            runtime,
        );
        let preloader = Preloader::new(scheduler.clone(), Arc::clone(&cache), config.preload_radius);

        log::debug!("rendering service started with {config:?}");

        Self {
            config,
            cache,
            store,
            scheduler,
            preloader,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &RenderScheduler {
        &self.scheduler
    }

    /// Open a document from its raw bytes
    pub fn open_document(&self, bytes: Vec<u8>) -> RenderResult<DocumentHandle> {
        Ok(self.store.open(bytes)?)
    }

    /// Handle of an open document
    pub fn document(&self, document: DocumentId) -> RenderResult<DocumentHandle> {
        self.store.get(document)
    }

    /// Close a document, dropping its cached pages and queued jobs
    ///
    /// Returns `false` if the document was not open.
    pub fn close_document(&self, document: DocumentId) -> bool {
        self.invalidate_document(document);
        self.store.close(document)
    }

    /// Rendered pixels for one page
    ///
    /// Bad requests fail before anything is queued. A cache hit returns
    /// without suspending; a miss queues the page at `Current` priority and
    /// waits for it, sharing the render with any identical request already
    /// queued or running.
    pub async fn get_rendered_page(
        &self,
        document: DocumentId,
        page: u32,
        scale: f32,
    ) -> RenderResult<Arc<RenderedPage>> {
        validate_scale(scale)?;
        self.store.get(document)?.page_size(page)?;

        let key = PageKey::new(document, page, scale);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit);
        }

        self.scheduler
            .enqueue(key, RenderPriority::Current)
            .wait()
            .await
    }

    /// Queue preloads around `page` without waiting for them
    ///
    /// Returns how many jobs were queued.
    pub fn preload_around(
        &self,
        document: DocumentId,
        page: u32,
        scale: f32,
        mode: ViewMode,
    ) -> RenderResult<usize> {
        validate_scale(scale)?;
        let handle = self.store.get(document)?;
        Ok(self.preloader.preload_around(&handle, page, scale, mode))
    }

    /// Forget everything rendered for `document`
    ///
    /// Queued jobs are cancelled first so that no job finishing in between
    /// can repopulate the cache. In-flight renders run to completion but
    /// their pages are not cached. Returns the number of evicted pages.
    pub fn invalidate_document(&self, document: DocumentId) -> usize {
        let cancelled = self.scheduler.cancel_document(document);
        let evicted = self.cache.invalidate(document);

        log::info!("invalidated document {document}: {evicted} pages evicted, {cancelled} jobs cancelled");
        evicted
    }

    pub fn metrics(&self) -> EngineMetrics {
        let cache = self.cache.stats();
        let scheduler = self.scheduler.stats();

        EngineMetrics {
            hit_rate: cache.hit_rate(),
            hits: cache.hits,
            misses: cache.misses,
            evictions: cache.evictions,
            oversized_inserts: cache.oversized_inserts,
            current_bytes: cache.current_bytes,
            budget_bytes: cache.budget_bytes,
            entry_count: cache.entry_count,
            avg_render_ms: scheduler.avg_render_ms,
            queued_jobs: scheduler.queued,
            in_flight_jobs: scheduler.in_flight,
        }
    }

    /// Change the cache budget, evicting immediately if it shrank
    pub fn set_memory_budget(&self, budget_bytes: usize) {
        self.cache.set_budget(budget_bytes);
    }
}

//! Adjacent-page preloading
//!
//! Picks the neighbours of the page on screen that the reader is most likely
//! to turn to next and queues them behind any on-screen work.

use stave_cache::{PageCache, PageKey};
use stave_render::DocumentHandle;
use stave_scheduler::{RenderPriority, RenderScheduler};
use std::sync::Arc;

/// How the viewer lays out pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// One page at a time; navigation moves by one page
    #[default]
    Single,

    /// Two facing pages; navigation moves by a pair
    Double,
}

/// Pages worth preloading around `current`, most useful first
///
/// Single mode walks outward one page at a time, next before previous:
/// `+1, -1, +2, -2, ...` for `radius` steps. Double mode walks pair by pair:
/// `(+2, +3)`, `(-2, -1)`, `(+4, +5)`, `(-4, -3)`, ... for `radius` pairs.
/// Pages outside `[1, page_count]`, the current page and repeats are skipped.
pub fn preload_order(current: u32, page_count: u32, mode: ViewMode, radius: u32) -> Vec<u32> {
    let current = i64::from(current);
    let mut offsets = Vec::new();

    for step in 1..=i64::from(radius) {
        match mode {
            ViewMode::Single => offsets.extend([step, -step]),
            ViewMode::Double => {
                let ahead = 2 * step;
                offsets.extend([ahead, ahead + 1, -ahead, -ahead + 1]);
            }
        }
    }

    let mut pages: Vec<u32> = Vec::with_capacity(offsets.len());
    for offset in offsets {
        let page = current + offset;
        if page < 1 || page > i64::from(page_count) || page == current {
            continue;
        }
        let page = page as u32;
        if !pages.contains(&page) {
            pages.push(page);
        }
    }
    pages
}

/// Queues preload jobs for neighbouring pages
#[derive(Clone)]
pub struct Preloader {
    scheduler: RenderScheduler,
    cache: Arc<PageCache>,
    radius: u32,
}

impl Preloader {
    pub fn new(scheduler: RenderScheduler, cache: Arc<PageCache>, radius: u32) -> Self {
        Self {
            scheduler,
            cache,
            radius,
        }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Queue preloads around `current` and return how many jobs were queued
    ///
    /// Pages already cached are skipped without touching their recency.
    /// Results are never awaited; failures only show up in the debug log.
    pub fn preload_around(
        &self,
        document: &DocumentHandle,
        current: u32,
        scale: f32,
        mode: ViewMode,
    ) -> usize {
        let mut queued = 0;

        for page in preload_order(current, document.page_count(), mode, self.radius) {
            let key = PageKey::new(document.id(), page, scale);
            if self.cache.contains(&key) {
                continue;
            }
            // Cached since the check above
            if self.scheduler.enqueue(key, RenderPriority::Preload).is_done() {
                continue;
            }
            queued += 1;
        }

        log::debug!(
            "queued {queued} preloads around page {current} of document {} ({mode:?})",
            document.id()
        );
        queued
    }
}

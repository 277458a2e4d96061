//! Stave Cache Library
//!
//! Memory-aware LRU cache for rendered sheet-music pages.

pub mod key;
pub mod ram;

pub use key::{DocumentId, PageKey, RenderedPage, BYTES_PER_PIXEL};
pub use ram::{CacheStats, PageCache};

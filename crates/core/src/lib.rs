//! Stave Core Library
//!
//! Rendering service for the sheet-music viewer: engine configuration,
//! adjacent-page preloading and the façade that ties the page cache, the
//! render pipeline and the scheduler together.
//!
//! # Example
//!
//! ```no_run
//! use stave_core::{EngineConfig, LopdfDecoder, RenderingService, ViewMode};
//! use std::sync::Arc;
//!
//! # async fn demo(bytes: Vec<u8>) -> Result<(), stave_core::RenderError> {
//! let service = RenderingService::new(Arc::new(LopdfDecoder::new()), EngineConfig::default());
//! let document = service.open_document(bytes)?;
//!
//! let page = service.get_rendered_page(document.id(), 1, 1.5).await?;
//! service.preload_around(document.id(), 1, 1.5, ViewMode::Single)?;
//! println!("{}x{} ({:.0}% hit rate)", page.width, page.height, service.metrics().hit_rate * 100.0);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod preload;
pub mod service;

pub use config::{ConfigError, ConfigResult, EngineConfig};
pub use preload::{preload_order, Preloader, ViewMode};
pub use service::{EngineMetrics, RenderingService};

pub use stave_cache::{CacheStats, DocumentId, PageKey, RenderedPage};
pub use stave_render::{
    DecodeError, DocumentHandle, LopdfDecoder, PageDecoder, PageSize, RawPixelBuffer, RenderError,
    RenderResult,
};
#[cfg(feature = "pdfium")]
pub use stave_render::PdfiumDecoder;
pub use stave_scheduler::{RenderPriority, SchedulerStats};

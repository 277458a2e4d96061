//! Stave Scheduler Library
//!
//! Priority render scheduler for page jobs.
//!
//! Jobs for the page on screen (`Current`) always dispatch before speculative
//! preloads (`Preload`), FIFO within each class. Identical requests share one
//! job, a configurable number of jobs render at once, and each job is bounded
//! by a timeout.
//!
//! # Example
//!
//! ```no_run
//! use stave_cache::{PageCache, PageKey};
//! use stave_render::{DocumentStore, LopdfDecoder};
//! use stave_scheduler::{RenderPriority, RenderScheduler, SchedulerConfig};
//! use std::sync::Arc;
//!
//! # async fn demo(bytes: Vec<u8>) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(DocumentStore::new(Arc::new(LopdfDecoder::new())));
//! let document = store.open(bytes)?;
//! let scheduler = RenderScheduler::new(
//!     Arc::new(PageCache::with_mb_budget(100)),
//!     store,
//!     SchedulerConfig::default(),
//!     tokio::runtime::Handle::current(),
//! );
//!
//! let handle = scheduler.enqueue(PageKey::new(document.id(), 1, 1.0), RenderPriority::Current);
//! let page = handle.wait().await?;
//! println!("{}x{}", page.width, page.height);
//! # Ok(())
//! # }
//! ```

mod cancel;
mod handle;
mod priority;
mod scheduler;

pub use cancel::CancellationToken;
pub use handle::CompletionHandle;
pub use priority::{JobId, PriorityQueue, QueuedJob, RenderPriority};
pub use scheduler::{JobState, RenderScheduler, SchedulerConfig, SchedulerStats};

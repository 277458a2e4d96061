//! Staleness tokens for in-flight jobs
//!
//! In-flight renders are never aborted mid-decode. Invalidating a document
//! instead cancels the token of each of its running jobs, and the scheduler
//! checks the token once the render returns to decide whether the result may
//! still enter the cache.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cancellation token shared between the scheduler and a running job
///
/// Multiple clones share the same underlying state.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel this token
    ///
    /// All clones observe the cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check if this token or any clone has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

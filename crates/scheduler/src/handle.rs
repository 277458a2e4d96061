//! Completion handles
//!
//! Every caller attached to a render job holds a [`CompletionHandle`] that
//! observes the same `watch` channel, so all of them resolve with one shared
//! outcome.

use stave_cache::{PageKey, RenderedPage};
use stave_render::{RenderError, RenderResult};
use std::sync::Arc;
use tokio::sync::watch;

/// Value published on a job's channel; `None` until the job finishes
pub(crate) type JobOutcome = Option<RenderResult<Arc<RenderedPage>>>;

/// Awaitable result of a render job
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    key: PageKey,
    receiver: watch::Receiver<JobOutcome>,
}

impl CompletionHandle {
    pub(crate) fn new(key: PageKey, receiver: watch::Receiver<JobOutcome>) -> Self {
        Self { key, receiver }
    }

    /// Page the job renders
    pub fn key(&self) -> PageKey {
        self.key
    }

    /// Wait for the job to finish
    ///
    /// A job whose scheduler went away without resolving it reports
    /// `Cancelled`.
    pub async fn wait(&self) -> RenderResult<Arc<RenderedPage>> {
        let mut receiver = self.receiver.clone();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or(Err(RenderError::Cancelled))
    }

    /// The outcome if the job already finished
    pub fn try_result(&self) -> Option<RenderResult<Arc<RenderedPage>>> {
        self.receiver.borrow().clone()
    }

    pub fn is_done(&self) -> bool {
        self.receiver.borrow().is_some()
    }
}

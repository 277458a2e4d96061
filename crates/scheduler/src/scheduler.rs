//! Render scheduler implementation
//!
//! Owns the job table and the priority queue, dispatches jobs onto the tokio
//! runtime with a concurrency limit, and publishes finished pages to the cache.
//!
//! Lock order is scheduler state, then cache. Finished results are written to
//! the cache while the state lock is held, so a job whose document was
//! invalidated can never slip a stale page in after the invalidation. Jobs
//! are spawned only after the state lock is released.

use crate::cancel::CancellationToken;
use crate::handle::{CompletionHandle, JobOutcome};
use crate::priority::{JobId, PriorityQueue, QueuedJob, RenderPriority};
use stave_cache::{DocumentId, PageCache, PageKey, RenderedPage};
use stave_render::{DocumentStore, RenderError, RenderPipeline, RenderResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;

/// Scheduler limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of jobs rendering at once (at least 1)
    pub max_concurrent_renders: usize,

    /// Time after which an in-flight job fails with `Timeout`
    pub render_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_renders: 2,
            render_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Render scheduler statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchedulerStats {
    /// Jobs created (requests that attached to an existing job are not counted)
    pub jobs_submitted: u64,

    /// Requests that attached to a queued or in-flight job
    pub jobs_deduplicated: u64,

    /// Jobs that produced a page
    pub jobs_completed: u64,

    /// Jobs that ended with an error
    pub jobs_failed: u64,

    /// Queued jobs dropped by document invalidation
    pub jobs_cancelled: u64,

    /// Jobs waiting for a slot
    pub queued: usize,

    /// Jobs currently rendering
    pub in_flight: usize,

    /// Wall time spent by completed jobs
    pub total_render_ms: u64,

    /// Mean wall time of a completed job, 0 before the first completion
    pub avg_render_ms: f64,
}

/// Lifecycle state of a live job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    InFlight,
}

struct JobEntry {
    id: JobId,
    priority: RenderPriority,
    state: JobState,
    sender: watch::Sender<JobOutcome>,
    token: CancellationToken,
}

#[derive(Default)]
struct SchedulerState {
    queue: PriorityQueue,
    jobs: HashMap<PageKey, JobEntry>,
    next_job_id: JobId,
    next_sequence: u64,
    in_flight: usize,
    stats: SchedulerStats,
}

impl SchedulerState {
    fn queue_job(&mut self, id: JobId, key: PageKey, priority: RenderPriority) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.queue.push(QueuedJob::new(id, key, priority, sequence));
    }
}

struct Inner {
    cache: Arc<PageCache>,
    store: Arc<DocumentStore>,
    pipeline: RenderPipeline,
    config: SchedulerConfig,
    runtime: Handle,
    state: Mutex<SchedulerState>,
}

/// Priority render scheduler
///
/// Cheap to clone; clones share one queue. At most one job exists per
/// [`PageKey`] while it is queued or rendering, and every request for that key
/// attaches to it.
#[derive(Clone)]
pub struct RenderScheduler {
    inner: Arc<Inner>,
}

impl RenderScheduler {
    /// Create a scheduler that spawns its jobs on `runtime`
    pub fn new(
        cache: Arc<PageCache>,
        store: Arc<DocumentStore>,
        config: SchedulerConfig,
        runtime: Handle,
    ) -> Self {
        let config = SchedulerConfig {
            max_concurrent_renders: config.max_concurrent_renders.max(1),
            ..config
        };
        let pipeline = RenderPipeline::new(store.decoder());

        Self {
            inner: Arc::new(Inner {
                cache,
                store,
                pipeline,
                config,
                runtime,
                state: Mutex::new(SchedulerState {
                    next_job_id: 1,
                    ..SchedulerState::default()
                }),
            }),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.config
    }

    /// Request a render of `key`
    ///
    /// Attaches to the existing job for `key` if there is one. A `Current`
    /// request for a page still queued as a preload promotes that job. A page
    /// that is already cached resolves the handle at once without a job.
    pub fn enqueue(&self, key: PageKey, priority: RenderPriority) -> CompletionHandle {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        // Checked under the state lock, which `finish` holds while caching
        if let Some(page) = self.inner.cache.peek(&key) {
            log::debug!("{key} already cached, no job needed");
            let (_, receiver) = watch::channel(Some(Ok(page)));
            return CompletionHandle::new(key, receiver);
        }

        if let Some(entry) = state.jobs.get_mut(&key) {
            state.stats.jobs_deduplicated += 1;
            let handle = CompletionHandle::new(key, entry.sender.subscribe());

            if entry.state == JobState::Queued && priority > entry.priority {
                let id = entry.id;
                entry.priority = priority;
                state.queue.remove_if(|job| job.id == id);
                state.queue_job(id, key, priority);
                log::debug!("promoted {key} to {priority:?}");
            } else {
                log::debug!("attached to existing job for {key}");
            }
            return handle;
        }

        let id = state.next_job_id;
        state.next_job_id += 1;
        let (sender, receiver) = watch::channel(None);

        state.jobs.insert(
            key,
            JobEntry {
                id,
                priority,
                state: JobState::Queued,
                sender,
                token: CancellationToken::new(),
            },
        );
        state.queue_job(id, key, priority);
        state.stats.jobs_submitted += 1;
        log::debug!("queued job {id} for {key} ({priority:?})");

        let ready = self.pump(state);
        drop(guard);
        self.spawn_all(ready);
        CompletionHandle::new(key, receiver)
    }

    /// Drop every queued job of `document` and mark its in-flight jobs stale
    ///
    /// Dropped jobs resolve with `Cancelled`. In-flight jobs still resolve
    /// their handles but their pages are not cached. Returns the number of
    /// queued jobs dropped.
    pub fn cancel_document(&self, document: DocumentId) -> usize {
        let mut guard = self.lock_state();
        let state = &mut *guard;

        let dropped = state.queue.remove_if(|job| job.key.document == document);
        for job in &dropped {
            if let Some(entry) = state.jobs.remove(&job.key) {
                entry.sender.send_replace(Some(Err(RenderError::Cancelled)));
            }
        }
        state.stats.jobs_cancelled += dropped.len() as u64;

        let mut stale = 0;
        for (key, entry) in &state.jobs {
            if key.document == document && entry.state == JobState::InFlight {
                entry.token.cancel();
                stale += 1;
            }
        }

        if !dropped.is_empty() || stale > 0 {
            log::info!(
                "cancelled {} queued jobs of document {document}, {stale} in flight marked stale",
                dropped.len()
            );
        }
        dropped.len()
    }

    /// State of the live job for `key`, if any
    pub fn job_state(&self, key: &PageKey) -> Option<JobState> {
        self.lock_state().jobs.get(key).map(|entry| entry.state)
    }

    /// Keys of queued jobs in dispatch order
    pub fn queued_keys(&self) -> Vec<PageKey> {
        self.lock_state()
            .queue
            .in_dispatch_order()
            .into_iter()
            .map(|job| job.key)
            .collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let state = self.lock_state();
        let mut stats = state.stats.clone();
        stats.queued = state.queue.len();
        stats.in_flight = state.in_flight;
        if stats.jobs_completed > 0 {
            stats.avg_render_ms = stats.total_render_ms as f64 / stats.jobs_completed as f64;
        }
        stats
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark queued jobs in flight until the concurrency limit is reached
    ///
    /// Returns the jobs to hand to [`RenderScheduler::spawn_all`] once the
    /// state lock is released.
    #[must_use]
    fn pump(&self, state: &mut SchedulerState) -> Vec<DispatchedJob> {
        let mut ready = Vec::new();
        while state.in_flight < self.inner.config.max_concurrent_renders {
            let Some(job) = state.queue.pop() else {
                break;
            };
            let Some(entry) = state.jobs.get_mut(&job.key) else {
                continue;
            };
            if entry.id != job.id {
                continue;
            }

            entry.state = JobState::InFlight;
            state.in_flight += 1;
            log::debug!("dispatching job {} for {} ({:?})", job.id, job.key, job.priority);

            ready.push(DispatchedJob {
                scheduler: self.clone(),
                job,
                token: entry.token.clone(),
                finished: false,
            });
        }
        ready
    }

    fn spawn_all(&self, ready: Vec<DispatchedJob>) {
        for dispatched in ready {
            self.inner.runtime.spawn(dispatched.run());
        }
    }

    fn finish(
        &self,
        job: QueuedJob,
        token: CancellationToken,
        outcome: RenderResult<RenderedPage>,
        elapsed: Duration,
    ) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        state.in_flight = state.in_flight.saturating_sub(1);

        let owns_entry = state
            .jobs
            .get(&job.key)
            .is_some_and(|entry| entry.id == job.id);
        let entry = if owns_entry {
            state.jobs.remove(&job.key)
        } else {
            None
        };
        let priority = entry.as_ref().map_or(job.priority, |entry| entry.priority);

        let result = match outcome {
            Ok(page) => {
                let elapsed_ms = elapsed.as_millis() as u64;
                state.stats.jobs_completed += 1;
                state.stats.total_render_ms += elapsed_ms;

                let page = Arc::new(page);
                if token.is_cancelled() {
                    log::debug!("discarding stale render of {}", job.key);
                    Ok(page)
                } else {
                    log::debug!("rendered {} in {elapsed_ms}ms", job.key);
                    Ok(self.inner.cache.put_shared(job.key, page))
                }
            }
            Err(RenderError::Cancelled) => {
                state.stats.jobs_cancelled += 1;
                log::debug!("render task for {} dropped before finishing", job.key);
                Err(RenderError::Cancelled)
            }
            Err(err) => {
                state.stats.jobs_failed += 1;
                match (&err, priority) {
                    (RenderError::Timeout { .. }, _) | (_, RenderPriority::Current) => {
                        log::warn!("render of {} failed: {err}", job.key);
                    }
                    (_, RenderPriority::Preload) => {
                        log::debug!("preload of {} failed: {err}", job.key);
                    }
                }
                Err(err)
            }
        };

        if let Some(entry) = entry {
            entry.sender.send_replace(Some(result));
        }

        let ready = self.pump(state);
        drop(guard);
        self.spawn_all(ready);
    }
}

/// A job marked in flight, owned by the task that renders it
///
/// If the task is dropped before it finishes, as happens when the runtime
/// shuts down, the job resolves with `Cancelled` and frees its slot.
struct DispatchedJob {
    scheduler: RenderScheduler,
    job: QueuedJob,
    token: CancellationToken,
    finished: bool,
}

impl DispatchedJob {
    async fn run(mut self) {
        let started = Instant::now();
        let inner = &self.scheduler.inner;
        let timeout = inner.config.render_timeout;
        let key = self.job.key;

        let outcome = match inner.store.get(key.document) {
            Ok(document) => {
                let render = inner.pipeline.render(&document, key.page, key.scale());
                match tokio::time::timeout(timeout, render).await {
                    Ok(result) => result,
                    Err(_) => Err(RenderError::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    }),
                }
            }
            Err(err) => Err(err),
        };

        self.complete(outcome, started.elapsed());
    }

    fn complete(&mut self, outcome: RenderResult<RenderedPage>, elapsed: Duration) {
        if std::mem::replace(&mut self.finished, true) {
            return;
        }
        self.scheduler
            .finish(self.job.clone(), self.token.clone(), outcome, elapsed);
    }
}

impl Drop for DispatchedJob {
    fn drop(&mut self) {
        self.complete(Err(RenderError::Cancelled), Duration::ZERO);
    }
}

//! Priority-ordered render queue
//!
//! Jobs for the page on screen always run before speculative preloads.
//! Within one priority class jobs run in the order they were queued.

use stave_cache::PageKey;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Render job priority classes
///
/// Higher variants are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPriority {
    /// Neighbouring pages rendered ahead of navigation (runs when idle)
    Preload = 0,

    /// Page currently displayed (must render immediately)
    Current = 1,
}

/// Unique job identifier
pub type JobId = u64;

/// A queued render job
///
/// Jobs are ordered by priority (higher priority first), then by insertion order
/// (earlier jobs first) to ensure FIFO ordering within the same priority level.
#[derive(Debug, Clone)]
pub struct QueuedJob {
    /// Unique job identifier
    pub id: JobId,

    /// Page the job renders
    pub key: PageKey,

    /// Job priority class
    pub priority: RenderPriority,

    /// Insertion order (used for FIFO within same priority)
    insertion_order: u64,
}

impl QueuedJob {
    pub fn new(id: JobId, key: PageKey, priority: RenderPriority, insertion_order: u64) -> Self {
        Self {
            id,
            key,
            priority,
            insertion_order,
        }
    }

    pub fn insertion_order(&self) -> u64 {
        self.insertion_order
    }
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap, so the earlier insertion must compare greater
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            other => other,
        }
    }
}

/// Priority queue of render jobs
///
/// Not synchronized on its own; the scheduler owns it behind its state lock.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<QueuedJob>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: QueuedJob) {
        self.heap.push(job);
    }

    /// Pop the highest priority, oldest job
    pub fn pop(&mut self) -> Option<QueuedJob> {
        self.heap.pop()
    }

    pub fn peek(&self) -> Option<&QueuedJob> {
        self.heap.peek()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove all jobs matching a predicate, returning them
    pub fn remove_if<F>(&mut self, predicate: F) -> Vec<QueuedJob>
    where
        F: Fn(&QueuedJob) -> bool,
    {
        let (removed, remaining): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.heap).into_iter().partition(predicate);
        self.heap = remaining.into_iter().collect();
        removed
    }

    /// Queued jobs in the order they would be dispatched
    pub fn in_dispatch_order(&self) -> Vec<QueuedJob> {
        let mut jobs = self.heap.clone().into_sorted_vec();
        jobs.reverse();
        jobs
    }
}

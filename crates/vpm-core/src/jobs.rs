// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Pool-backed time-priority queue of hint submissions.
//!
//! Jobs are recycled through a fixed free list to keep allocator traffic off
//! the submission path. The pool is sized for the worst burst observed while
//! the looper is not yet draining (boot reaches ~45 queued jobs); running dry
//! falls back to plain allocation with a single-line warning.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::trace;

/// Default job pool capacity.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Predicate evaluated at dispatch time to gate an action on a feature flag.
pub type FlagPredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// One (node, value, deadline) triple carried inside a request or cancel.
#[derive(Clone)]
pub struct NodeAction {
    pub node_index: usize,
    pub value_index: usize,
    /// Zero means the request never expires.
    pub timeout: Duration,
    /// Boolean property that must not read false for the action to apply.
    pub enable_property: Option<String>,
    pub enable_flag: Option<FlagPredicate>,
    pub disable_flag: Option<FlagPredicate>,
}

impl NodeAction {
    pub fn new(node_index: usize, value_index: usize, timeout: Duration) -> Self {
        Self {
            node_index,
            value_index,
            timeout,
            enable_property: None,
            enable_flag: None,
            disable_flag: None,
        }
    }

    pub fn with_enable_property(mut self, property: impl Into<String>) -> Self {
        self.enable_property = Some(property.into());
        self
    }

    pub fn with_enable_flag(mut self, flag: FlagPredicate) -> Self {
        self.enable_flag = Some(flag);
        self
    }

    pub fn with_disable_flag(mut self, flag: FlagPredicate) -> Self {
        self.disable_flag = Some(flag);
        self
    }
}

impl fmt::Debug for NodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeAction")
            .field("node_index", &self.node_index)
            .field("value_index", &self.value_index)
            .field("timeout", &self.timeout)
            .field("enable_property", &self.enable_property)
            .field("enable_flag", &self.enable_flag.is_some())
            .field("disable_flag", &self.disable_flag.is_some())
            .finish()
    }
}

/// A submitted request or cancel, drawn from the pool.
#[derive(Debug)]
pub struct Job {
    pub actions: Vec<NodeAction>,
    pub hint_type: String,
    pub scheduled_at: Instant,
    pub is_cancel: bool,
}

impl Job {
    fn new() -> Self {
        Self {
            actions: Vec::new(),
            hint_type: String::new(),
            scheduled_at: Instant::now(),
            is_cancel: false,
        }
    }

    /// Clear all fields before the job returns to the pool.
    pub fn reset(&mut self) {
        self.actions.clear();
        self.hint_type.clear();
        self.scheduled_at = Instant::now();
        self.is_cancel = false;
    }
}

// Min-heap on scheduled_at: earlier time means higher priority.
struct QueuedJob(Box<Job>);

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.0.scheduled_at == other.0.scheduled_at
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
        other.0.scheduled_at.cmp(&self.0.scheduled_at)
    }
}

struct QueueState {
    queue: BinaryHeap<QueuedJob>,
    pool: VecDeque<Box<Job>>,
}

/// Thread-safe job queue plus free list, guarded by one mutex.
pub struct JobQueue {
    state: Mutex<QueueState>,
    pool_limit: usize,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::with_pool_size(DEFAULT_POOL_SIZE)
    }

    pub fn with_pool_size(pool_size: usize) -> Self {
        let pool = (0..pool_size).map(|_| Box::new(Job::new())).collect();
        Self {
            state: Mutex::new(QueueState { queue: BinaryHeap::new(), pool }),
            pool_limit: pool_size,
        }
    }

    /// Take a job from the free list, allocating when the pool is dry.
    pub fn acquire_job(&self) -> Box<Job> {
        let mut state = self.state.lock();
        match state.pool.pop_front() {
            Some(job) => job,
            None => {
                let label = format!(
                    "JobPoolEmpty[queue:{},pool:{},limit:{}]",
                    state.queue.len(),
                    state.pool.len(),
                    self.pool_limit
                );
                warn!("{label}");
                trace::instant(&label);
                Box::new(Job::new())
            }
        }
    }

    pub fn enqueue(&self, job: Box<Job>) {
        self.state.lock().queue.push(QueuedJob(job));
    }

    /// Remove and return the job with the earliest schedule time.
    pub fn dequeue(&self) -> Option<Box<Job>> {
        self.state.lock().queue.pop().map(|QueuedJob(job)| job)
    }

    /// Reset a consumed job and return it to the free list.
    pub fn release(&self, mut job: Box<Job>) {
        job.reset();
        self.state.lock().pool.push_back(job);
    }

    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pool_len(&self) -> usize {
        self.state.lock().pool.len()
    }

    /// Enumerate queued jobs without perturbing their order.
    pub fn dump(&self, w: &mut dyn Write) -> io::Result<()> {
        let mut state = self.state.lock();
        writeln!(w, "Job Queue Dump:")?;
        writeln!(w, "-------------------")?;
        writeln!(w, "Queue Size: {}", state.queue.len())?;
        writeln!(w, "Pool Size: {}", state.pool.len())?;
        writeln!(w, "-------------------")?;
        if state.queue.is_empty() {
            return Ok(());
        }
        writeln!(w, "Job Queue:")?;
        let mut drained = Vec::with_capacity(state.queue.len());
        while let Some(entry) = state.queue.pop() {
            writeln!(
                w,
                "  Hint Type: {}, Age: {}ms, Is Cancel: {}",
                entry.0.hint_type,
                entry.0.scheduled_at.elapsed().as_millis(),
                entry.0.is_cancel
            )?;
            drained.push(entry);
        }
        for entry in drained {
            state.queue.push(entry);
        }
        Ok(())
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_job(queue: &JobQueue, hint: &str, at: Instant, is_cancel: bool) -> Box<Job> {
        let mut job = queue.acquire_job();
        job.hint_type = hint.to_string();
        job.scheduled_at = at;
        job.is_cancel = is_cancel;
        job
    }

    #[test]
    fn dequeue_follows_schedule_time_not_insert_order() {
        let queue = JobQueue::new();
        let base = Instant::now();
        queue.enqueue(make_job(&queue, "later", base + Duration::from_millis(2), false));
        queue.enqueue(make_job(&queue, "earlier", base + Duration::from_millis(1), false));

        assert_eq!(queue.dequeue().unwrap().hint_type, "earlier");
        assert_eq!(queue.dequeue().unwrap().hint_type, "later");
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn pool_runs_dry_and_still_serves() {
        let queue = JobQueue::with_pool_size(2);
        let a = queue.acquire_job();
        let b = queue.acquire_job();
        assert_eq!(queue.pool_len(), 0);
        // Pool is empty; this one is freshly allocated.
        let c = queue.acquire_job();
        queue.release(a);
        queue.release(b);
        queue.release(c);
        // The extra allocation grows the free list past the original size.
        assert_eq!(queue.pool_len(), 3);
    }

    #[test]
    fn released_jobs_come_back_cleared() {
        let queue = JobQueue::with_pool_size(1);
        let mut job = queue.acquire_job();
        job.hint_type = "LAUNCH".to_string();
        job.is_cancel = true;
        job.actions.push(NodeAction::new(0, 1, Duration::ZERO));
        queue.release(job);

        let job = queue.acquire_job();
        assert!(job.hint_type.is_empty());
        assert!(!job.is_cancel);
        assert!(job.actions.is_empty());
    }

    #[test]
    fn recycling_returns_all_jobs_to_the_pool() {
        let queue = JobQueue::with_pool_size(8);
        let jobs: Vec<_> = (0..8).map(|_| queue.acquire_job()).collect();
        assert_eq!(queue.pool_len(), 0);
        for job in jobs {
            queue.release(job);
        }
        assert_eq!(queue.pool_len(), 8);
    }

    #[test]
    fn dump_preserves_queue_order() {
        let queue = JobQueue::new();
        let base = Instant::now();
        for (hint, offset) in [("c", 3u64), ("a", 1), ("b", 2)] {
            queue.enqueue(make_job(&queue, hint, base + Duration::from_millis(offset), false));
        }
        let mut out = Vec::new();
        queue.dump(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Queue Size: 3"));

        assert_eq!(queue.dequeue().unwrap().hint_type, "a");
        assert_eq!(queue.dequeue().unwrap().hint_type, "b");
        assert_eq!(queue.dequeue().unwrap().hint_type, "c");
    }
}

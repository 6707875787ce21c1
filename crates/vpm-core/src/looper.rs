// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! The dispatcher thread binding nodes to the job queue.
//!
//! One worker consumes jobs strictly in schedule-time order, folds each
//! job's actions into the per-node request tables, then runs the node update
//! sequence twice. Exactly two passes: nodes can depend on each other (e.g.
//! raising a min-frequency above the current max-frequency fails until the
//! max moves), and no known dependency chain is longer than one hop. Only the
//! second pass's expiry timeouts drive the sleep.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};

use crate::jobs::{Job, JobQueue, NodeAction};
use crate::node::Node;
use crate::{properties, trace};

/// cgroup v1 tasks file that prefers idle cores; writing "0" moves the
/// calling thread. Missing on most non-vendor kernels, hence best-effort.
const IDLE_TASK_PROFILE_PATH: &str = "/dev/cpuset/background/tasks";

const LOOPER_THREAD_NAME: &str = "vpm-node-looper";

struct LooperShared {
    nodes: Mutex<Vec<Node>>,
    wake: Condvar,
    queue: JobQueue,
    running: AtomicBool,
    exiting: AtomicBool,
}

/// Single-threaded scheduler for node updates.
pub struct NodeLooper {
    shared: Arc<LooperShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl NodeLooper {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self {
            shared: Arc::new(LooperShared {
                nodes: Mutex::new(nodes),
                wake: Condvar::new(),
                queue: JobQueue::new(),
                running: AtomicBool::new(false),
                exiting: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Submit a hint. Returns `false` once the looper is stopping.
    pub fn request(&self, hint: &str, actions: &[NodeAction]) -> bool {
        self.submit(hint, actions, false)
    }

    /// Withdraw a hint from the referenced nodes.
    pub fn cancel(&self, hint: &str, actions: &[NodeAction]) -> bool {
        self.submit(hint, actions, true)
    }

    fn submit(&self, hint: &str, actions: &[NodeAction], is_cancel: bool) -> bool {
        if self.shared.exiting.load(Ordering::Acquire) {
            warn!("node looper is exiting");
            return false;
        }
        if !self.shared.running.load(Ordering::Acquire) {
            warn!(hint, is_cancel, "node looper is not running");
        }

        let mut job = self.shared.queue.acquire_job();
        job.hint_type = hint.to_string();
        job.is_cancel = is_cancel;
        job.scheduled_at = std::time::Instant::now();
        job.actions.extend_from_slice(actions);
        let sign = if is_cancel { '-' } else { '+' };
        trace::instant(&format!("enq:{sign}{hint}"));
        self.shared.queue.enqueue(job);

        // Notify while holding the loop mutex so a wakeup between the
        // worker's final queue check and its wait cannot be lost.
        let _guard = self.shared.nodes.lock();
        self.shared.wake.notify_one();
        true
    }

    /// Start the worker thread. Idempotent.
    pub fn start(&self) -> bool {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return true;
        }
        self.shared.exiting.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);
        let shared = Arc::clone(&self.shared);
        match thread::Builder::new()
            .name(LOOPER_THREAD_NAME.to_string())
            .spawn(move || worker(shared))
        {
            Ok(handle) => {
                *slot = Some(handle);
                info!("node looper started");
                true
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                error!(error = %e, "node looper start failed");
                false
            }
        }
    }

    /// Stop and join the worker thread. Idempotent.
    pub fn stop(&self) {
        let handle = {
            let mut slot = self.thread.lock();
            slot.take()
        };
        if let Some(handle) = handle {
            info!("node looper stopping");
            self.shared.exiting.store(true, Ordering::Release);
            {
                let _guard = self.shared.nodes.lock();
                self.shared.wake.notify_one();
            }
            if handle.join().is_err() {
                error!("node looper thread panicked during shutdown");
            }
            self.shared.running.store(false, Ordering::Release);
            info!("node looper stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Snapshot every node and the queue.
    pub fn dump(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        let nodes = self.shared.nodes.lock();
        for node in nodes.iter() {
            node.dump(w)?;
        }
        self.shared.queue.dump(w)
    }

    /// Run a closure against a node, for tests and dump tooling.
    pub fn with_node<R>(&self, index: usize, f: impl FnOnce(&Node) -> R) -> Option<R> {
        let nodes = self.shared.nodes.lock();
        nodes.get(index).map(f)
    }
}

impl Drop for NodeLooper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker(shared: Arc<LooperShared>) {
    apply_idle_task_profile(Path::new(IDLE_TASK_PROFILE_PATH));
    while !shared.exiting.load(Ordering::Acquire) {
        tick(&shared);
    }
}

/// One wakeup: absorb at most one job, converge nodes, sleep.
fn tick(shared: &LooperShared) {
    let job = shared.queue.dequeue();
    let mut nodes = shared.nodes.lock();

    if let Some(job) = job {
        absorb(&mut nodes, &job);
        shared.queue.release(job);
    }

    // Pass 1 tolerates failures silently; pass 2 may succeed where pass 1
    // could not because a dependency node advanced in between.
    let _scope = trace::TraceScope::enter("update_nodes");
    for node in nodes.iter_mut() {
        node.update(false);
    }
    let mut timeout: Option<Duration> = None;
    for node in nodes.iter_mut() {
        if let Some(t) = node.update(true) {
            timeout = Some(timeout.map_or(t, |cur| cur.min(t)));
        }
    }
    drop(_scope);

    if !shared.queue.is_empty() {
        // Spin to drain: more jobs are already waiting.
        timeout = Some(Duration::ZERO);
    }

    let _scope = trace::TraceScope::enter("wait");
    match timeout {
        Some(t) => {
            shared.wake.wait_for(&mut nodes, t);
        }
        None => {
            shared.wake.wait(&mut nodes);
        }
    }
}

fn absorb(nodes: &mut [Node], job: &Job) {
    let sign = if job.is_cancel { "-" } else { "+" };
    let _scope = trace::TraceScope::enter(&format!("deq:{}:{}", job.hint_type, sign));
    for action in &job.actions {
        if action.node_index >= nodes.len() {
            error!(
                node_index = action.node_index,
                node_count = nodes.len(),
                "node index out of bound"
            );
            continue;
        }
        let node = &mut nodes[action.node_index];
        if let Some(property) = &action.enable_property {
            if !properties::get_bool(property, true) {
                trace::instant(&format!("{}:prop:disabled", node.name()));
                continue;
            }
        }
        if action.enable_flag.as_ref().is_some_and(|f| !f())
            || action.disable_flag.as_ref().is_some_and(|f| f())
        {
            continue;
        }
        if job.is_cancel {
            trace::instant(&format!("{}:disable", node.name()));
            node.remove_request(&job.hint_type);
        } else {
            // Zero timeout and clock overflow both mean "never expires".
            let deadline = if action.timeout.is_zero() {
                None
            } else {
                job.scheduled_at.checked_add(action.timeout)
            };
            trace::instant(&format!("{}:enable", node.name()));
            if !node.add_request(action.value_index, &job.hint_type, deadline) {
                error!(
                    node = node.name(),
                    value_index = action.value_index,
                    "add_request rejected"
                );
            }
        }
    }
}

fn apply_idle_task_profile(path: &Path) {
    if !path.exists() {
        warn!("idle task profile not supported on this kernel");
        return;
    }
    if let Err(e) = std::fs::write(path, "0") {
        warn!(error = %e, "failed to join idle task profile");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{TestNode, DEFAULT_REQUEST_CAPACITY};

    fn looper_with(values: &[&str]) -> (NodeLooper, TestNode) {
        let sink = TestNode::new();
        let node = Node::new(
            "cpu_min",
            values.iter().map(|s| s.to_string()).collect(),
            0,
            false,
            DEFAULT_REQUEST_CAPACITY,
            Box::new(sink.clone()),
        )
        .expect("valid node");
        (NodeLooper::new(vec![node]), sink)
    }

    fn wait_for_value(sink: &TestNode, value: &str, budget: Duration) -> bool {
        let deadline = std::time::Instant::now() + budget;
        while std::time::Instant::now() < deadline {
            if sink.last_value().as_deref() == Some(value) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn request_applies_and_expires() {
        let (looper, sink) = looper_with(&["0", "600", "1200"]);
        looper.start();

        assert!(looper.request("LAUNCH", &[NodeAction::new(0, 2, Duration::from_millis(120))]));
        assert!(wait_for_value(&sink, "1200", Duration::from_millis(500)));
        // Expiry liveness: withdrawn no later than timeout + one tick.
        assert!(wait_for_value(&sink, "0", Duration::from_millis(500)));

        looper.stop();
    }

    #[test]
    fn cancel_is_idempotent() {
        let (looper, sink) = looper_with(&["0", "600", "1200"]);
        looper.start();

        let actions = [NodeAction::new(0, 2, Duration::from_secs(10))];
        looper.request("LAUNCH", &actions);
        assert!(wait_for_value(&sink, "1200", Duration::from_millis(500)));
        looper.cancel("LAUNCH", &actions);
        looper.cancel("LAUNCH", &actions);
        assert!(wait_for_value(&sink, "0", Duration::from_millis(500)));
        looper.stop();
        assert_eq!(sink.values(), vec!["1200", "0"]);
    }

    #[test]
    fn submit_fails_after_stop() {
        let (looper, _sink) = looper_with(&["0", "600"]);
        looper.start();
        looper.stop();
        assert!(!looper.request("LAUNCH", &[NodeAction::new(0, 1, Duration::ZERO)]));
        assert!(!looper.cancel("LAUNCH", &[NodeAction::new(0, 1, Duration::ZERO)]));
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let (looper, _sink) = looper_with(&["0"]);
        assert!(looper.start());
        assert!(looper.start());
        looper.stop();
        looper.stop();
    }

    #[test]
    fn disabled_property_gates_action() {
        let _guard = properties::TEST_LOCK.lock();
        properties::teardown();
        properties::set("vendor.powerhal.touch.enable", "0");
        let (looper, sink) = looper_with(&["0", "600"]);
        looper.start();

        let gated = NodeAction::new(0, 1, Duration::ZERO)
            .with_enable_property("vendor.powerhal.touch.enable");
        looper.request("TOUCH", &[gated]);
        thread::sleep(Duration::from_millis(100));
        assert!(sink.values().is_empty());

        looper.stop();
        properties::teardown();
    }

    #[test]
    fn flag_predicates_gate_action() {
        let (looper, sink) = looper_with(&["0", "600"]);
        looper.start();

        let disabled = NodeAction::new(0, 1, Duration::ZERO)
            .with_enable_flag(Arc::new(|| false));
        looper.request("A", &[disabled]);
        let masked = NodeAction::new(0, 1, Duration::ZERO)
            .with_disable_flag(Arc::new(|| true));
        looper.request("B", &[masked]);
        thread::sleep(Duration::from_millis(100));
        assert!(sink.values().is_empty());

        let live = NodeAction::new(0, 1, Duration::ZERO)
            .with_enable_flag(Arc::new(|| true))
            .with_disable_flag(Arc::new(|| false));
        looper.request("C", &[live]);
        assert!(wait_for_value(&sink, "600", Duration::from_millis(500)));
        looper.stop();
    }

    #[test]
    fn out_of_bound_node_index_is_skipped() {
        let (looper, sink) = looper_with(&["0", "600"]);
        looper.start();
        looper.request(
            "MIXED",
            &[
                NodeAction::new(7, 1, Duration::ZERO),
                NodeAction::new(0, 1, Duration::ZERO),
            ],
        );
        assert!(wait_for_value(&sink, "600", Duration::from_millis(500)));
        looper.stop();
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! A tunable endpoint with a small ordered set of allowed values.
//!
//! Every node tracks the hints currently requesting a value from it, each
//! with its own expiry deadline. On update the node purges expired requests,
//! picks the highest-priority survivor (lowest value index, earliest arrival
//! on ties) and writes the chosen value only when it differs from what the
//! endpoint already holds.

pub mod writer;

use std::io::{self, Write};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::error::{CoreError, CoreResult};

pub use writer::{FileNode, NodeWriter, PropertyNode, TestNode};

/// Default bound on concurrently tracked hints per node.
pub const DEFAULT_REQUEST_CAPACITY: usize = 8;

/// One hint's claim on a node. `deadline == None` means the request never
/// expires on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub value_index: usize,
    pub deadline: Option<Instant>,
}

impl Request {
    fn active(&self, now: Instant) -> bool {
        self.deadline.map_or(true, |d| d > now)
    }
}

/// Deadlines merge toward the later one; `None` is infinity.
fn later_deadline(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        _ => None,
    }
}

pub struct Node {
    name: String,
    values: Vec<String>,
    reset_value_index: usize,
    current_value_index: Option<usize>,
    // Arrival order; linear scans are fine at the default depth of 8.
    requests: Vec<(String, Request)>,
    capacity: usize,
    writer: Box<dyn NodeWriter>,
}

impl Node {
    /// Build a node over `writer`. With `reset_on_init` the first update
    /// writes the reset value unconditionally; otherwise the endpoint is
    /// assumed to already hold it.
    pub fn new(
        name: impl Into<String>,
        values: Vec<String>,
        reset_value_index: usize,
        reset_on_init: bool,
        capacity: usize,
        writer: Box<dyn NodeWriter>,
    ) -> CoreResult<Self> {
        let name = name.into();
        if values.is_empty() {
            return Err(CoreError::InvalidArgument(format!("node '{name}' has no values")));
        }
        if reset_value_index >= values.len() {
            return Err(CoreError::InvalidArgument(format!(
                "node '{name}' reset index {reset_value_index} out of {} values",
                values.len()
            )));
        }
        let current_value_index = if reset_on_init { None } else { Some(reset_value_index) };
        Ok(Self {
            name,
            values,
            reset_value_index,
            current_value_index,
            requests: Vec::new(),
            capacity: capacity.max(1),
            writer,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    pub fn current_value_index(&self) -> Option<usize> {
        self.current_value_index
    }

    /// Insert or refresh the request for `hint`.
    ///
    /// A refresh takes the new value index, keeps the later of the two
    /// deadlines and keeps the hint's arrival slot. Inserting past capacity
    /// evicts the oldest arrival. Returns `false` only for an out-of-range
    /// value index.
    pub fn add_request(&mut self, value_index: usize, hint: &str, deadline: Option<Instant>) -> bool {
        if value_index >= self.values.len() {
            return false;
        }
        if let Some((_, req)) = self.requests.iter_mut().find(|(h, _)| h == hint) {
            req.value_index = value_index;
            req.deadline = later_deadline(req.deadline, deadline);
            return true;
        }
        if self.requests.len() >= self.capacity {
            let (evicted, _) = self.requests.remove(0);
            warn!(node = %self.name, hint = %evicted, "request table full, evicting oldest");
        }
        self.requests.push((hint.to_string(), Request { value_index, deadline }));
        true
    }

    /// Drop the request for `hint`; no-op when absent.
    pub fn remove_request(&mut self, hint: &str) {
        self.requests.retain(|(h, _)| h != hint);
    }

    /// Refresh only the deadline of an existing request.
    pub fn reset_request(&mut self, hint: &str, deadline: Option<Instant>) {
        if let Some((_, req)) = self.requests.iter_mut().find(|(h, _)| h == hint) {
            req.deadline = later_deadline(req.deadline, deadline);
        }
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Purge expired requests, apply the winning value, and report the time
    /// until the nearest remaining deadline (`None` when indefinite).
    ///
    /// A failed write is left for the next pass: `current_value_index` keeps
    /// its old value so the same write is retried. The first of the looper's
    /// two passes calls this with `log_failure = false` because cross-node
    /// ordering constraints make first-pass failures expected.
    pub fn update(&mut self, log_failure: bool) -> Option<Duration> {
        let now = Instant::now();
        self.requests.retain(|(_, req)| req.active(now));

        let mut next_expiry: Option<Duration> = None;
        let mut target: Option<usize> = None;
        for (_, req) in &self.requests {
            if let Some(deadline) = req.deadline {
                let remaining = deadline.saturating_duration_since(now);
                next_expiry = Some(next_expiry.map_or(remaining, |t| t.min(remaining)));
            }
            // Strict less-than keeps the earliest arrival on ties.
            if target.map_or(true, |t| req.value_index < t) {
                target = Some(req.value_index);
            }
        }
        let target = target.unwrap_or(self.reset_value_index);

        if self.current_value_index != Some(target) {
            let value = &self.values[target];
            match self.writer.write_value(value) {
                Ok(()) => {
                    debug!(node = %self.name, value = %value, "applied");
                    self.current_value_index = Some(target);
                }
                Err(e) => {
                    if log_failure {
                        error!(node = %self.name, value = %value, error = %e, "write failed");
                    }
                }
            }
        }
        next_expiry
    }

    pub fn dump(&self, w: &mut dyn Write) -> io::Result<()> {
        let current = match self.current_value_index {
            Some(i) => format!("{} ({})", i, self.values[i]),
            None => "unset".to_string(),
        };
        writeln!(
            w,
            "Node: {} [{}] current: {} requests: {}",
            self.name,
            self.writer.describe(),
            current,
            self.requests.len()
        )?;
        let now = Instant::now();
        for (hint, req) in &self.requests {
            let remaining = match req.deadline {
                Some(d) => format!("{}ms", d.saturating_duration_since(now).as_millis()),
                None => "inf".to_string(),
            };
            writeln!(w, "  {} -> value[{}] remaining: {}", hint, req.value_index, remaining)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(values: &[&str]) -> (Node, TestNode) {
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
        (node, sink)
    }

    fn in_ms(ms: u64) -> Option<Instant> {
        Instant::now().checked_add(Duration::from_millis(ms))
    }

    #[test]
    fn lowest_value_index_wins() {
        let (mut node, sink) = test_node(&["0", "600", "1200"]);
        assert!(node.add_request(2, "LAUNCH", None));
        assert!(node.add_request(1, "TOUCH", None));
        node.update(true);
        assert_eq!(sink.values(), vec!["600"]);
    }

    #[test]
    fn tie_goes_to_earliest_arrival() {
        let (mut node, _sink) = test_node(&["0", "600", "1200"]);
        node.add_request(1, "FIRST", None);
        node.add_request(1, "SECOND", None);
        node.remove_request("SECOND");
        node.update(true);
        assert_eq!(node.current_value_index(), Some(1));
    }

    #[test]
    fn no_write_when_value_unchanged() {
        let (mut node, sink) = test_node(&["0", "600"]);
        node.add_request(1, "LAUNCH", None);
        node.update(true);
        node.update(true);
        node.update(true);
        assert_eq!(sink.values(), vec!["600"]);
    }

    #[test]
    fn out_of_range_value_index_is_rejected() {
        let (mut node, sink) = test_node(&["0", "600"]);
        assert!(!node.add_request(2, "LAUNCH", None));
        node.update(true);
        assert!(sink.values().is_empty());
        assert_eq!(node.request_count(), 0);
    }

    #[test]
    fn refresh_takes_new_index_and_later_deadline() {
        let (mut node, _) = test_node(&["0", "600", "1200"]);
        node.add_request(2, "LAUNCH", in_ms(5_000));
        node.add_request(1, "LAUNCH", in_ms(100));
        assert_eq!(node.request_count(), 1);
        let (_, req) = &node_requests(&node)[0];
        assert_eq!(req.value_index, 1);
        // max(5s, 100ms) is still roughly 5s out.
        let remaining = req.deadline.unwrap().saturating_duration_since(Instant::now());
        assert!(remaining > Duration::from_secs(4));
    }

    #[test]
    fn indefinite_deadline_survives_refresh() {
        let (mut node, _) = test_node(&["0", "600"]);
        node.add_request(1, "LAUNCH", None);
        node.add_request(1, "LAUNCH", in_ms(10));
        let (_, req) = &node_requests(&node)[0];
        assert_eq!(req.deadline, None);
    }

    #[test]
    fn expired_request_releases_node() {
        let (mut node, sink) = test_node(&["0", "600"]);
        node.add_request(1, "LAUNCH", in_ms(20));
        node.update(true);
        assert_eq!(sink.last_value().as_deref(), Some("600"));
        std::thread::sleep(Duration::from_millis(40));
        let next = node.update(true);
        assert_eq!(sink.last_value().as_deref(), Some("0"));
        assert_eq!(next, None);
    }

    #[test]
    fn update_reports_time_to_nearest_expiry() {
        let (mut node, _) = test_node(&["0", "600", "1200"]);
        node.add_request(1, "SHORT", in_ms(50));
        node.add_request(2, "LONG", in_ms(5_000));
        let next = node.update(true).expect("finite deadline");
        assert!(next <= Duration::from_millis(50));
    }

    #[test]
    fn capacity_evicts_oldest_arrival() {
        let sink = TestNode::new();
        let mut node = Node::new(
            "gpu_freq",
            vec!["0".into(), "1".into()],
            0,
            false,
            2,
            Box::new(sink),
        )
        .expect("valid node");
        node.add_request(1, "A", None);
        node.add_request(1, "B", None);
        node.add_request(1, "C", None);
        let hints: Vec<_> = node_requests(&node).iter().map(|(h, _)| h.clone()).collect();
        assert_eq!(hints, vec!["B", "C"]);
    }

    #[test]
    fn failed_write_is_retried_on_next_pass() {
        let (mut node, sink) = test_node(&["0", "600"]);
        node.add_request(1, "LAUNCH", None);
        sink.fail_next_writes(1);
        node.update(false);
        assert_eq!(node.current_value_index(), Some(0));
        node.update(true);
        assert_eq!(node.current_value_index(), Some(1));
        assert_eq!(sink.values(), vec!["600"]);
    }

    #[test]
    fn reset_on_init_forces_first_write() {
        let sink = TestNode::new();
        let mut node = Node::new(
            "cpu_max",
            vec!["max".into(), "1200".into()],
            0,
            true,
            DEFAULT_REQUEST_CAPACITY,
            Box::new(sink.clone()),
        )
        .expect("valid node");
        node.update(true);
        assert_eq!(sink.values(), vec!["max"]);
    }

    fn node_requests(node: &Node) -> &Vec<(String, Request)> {
        &node.requests
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # VPM hint dispatch core
//!
//! Applies time-bounded configuration hints to a set of tunable kernel
//! nodes. Clients submit `request`/`cancel` jobs; a single dispatcher thread
//! consumes them in schedule-time order and converges every node onto the
//! highest-priority active value, releasing it again when deadlines expire.
//!
//! ## Architecture
//! - [`node::Node`] owns one endpoint and its pending requests
//! - [`jobs::JobQueue`] is the pool-backed time-priority queue
//! - [`looper::NodeLooper`] is the worker binding the two
//! - [`flags`]/[`properties`] gate actions at dispatch time
//! - [`trace`] mirrors the dispatch path as structured events

pub mod error;
pub mod flags;
pub mod jobs;
pub mod looper;
pub mod metrics;
pub mod node;
pub mod properties;
pub mod tgid;
pub mod trace;

pub use error::{CoreError, CoreResult};
pub use jobs::{FlagPredicate, Job, JobQueue, NodeAction, DEFAULT_POOL_SIZE};
pub use looper::NodeLooper;
pub use metrics::{FrameBuckets, GameFrameMetrics, GameFrameSample, SessionMetrics};
pub use node::{FileNode, Node, NodeWriter, PropertyNode, TestNode, DEFAULT_REQUEST_CAPACITY};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

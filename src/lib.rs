// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # VPM: vendor performance manager
//!
//! Facade over the workspace crates:
//! - [`core`]: tunable nodes, the time-priority job queue and the dispatcher
//!   thread that resolves concurrent hints into endpoint writes
//! - [`haptics`]: waveform composition and the actuator runtime
//! - [`config`]: boot-time node catalog
//! - [`observability`]: logging bootstrap

pub use vpm_config as config;
pub use vpm_core as core;
pub use vpm_haptics as haptics;
pub use vpm_observability as observability;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

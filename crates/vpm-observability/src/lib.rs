// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # VPM observability
//!
//! Unified logging bootstrap for the workspace: per-crate debug switches,
//! console output, and rolling JSON files with run-folder retention.

pub mod cli;
pub mod init;

pub use cli::DebugFlags;
pub use init::{init_logging, init_logging_default, LoggingGuard};

/// Crates that get their own log file.
pub const KNOWN_CRATES: &[&str] = &["vpm_core", "vpm_haptics", "vpm_config"];

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialization.
//!
//! Human-readable console output plus JSON rolling files under a timestamped
//! run folder, with retention pruning of old runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::DebugFlags;
use crate::KNOWN_CRATES;

const DEFAULT_RETENTION_RUNS: usize = 10;

/// Keeps the non-blocking writers flushing; drop on shutdown.
pub struct LoggingGuard {
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: PathBuf,
}

impl LoggingGuard {
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Initialize logging with console output and per-crate JSON files.
///
/// Each process run gets its own folder:
/// ```text
/// ./logs/
///   └── run_20250101_120000/
///       ├── vpm_core.log
///       ├── vpm_haptics.log
///       └── vpm.log (combined)
/// ```
pub fn init_logging(
    debug_flags: &DebugFlags,
    log_dir: Option<PathBuf>,
    retention_runs: Option<usize>,
) -> Result<LoggingGuard> {
    let base_log_dir = log_dir.unwrap_or_else(|| PathBuf::from("./logs"));
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = base_log_dir.join(format!("run_{timestamp}"));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_runs(&base_log_dir, retention_runs.unwrap_or(DEFAULT_RETENTION_RUNS))?;

    let filter = debug_flags.to_filter_string();
    let mut layers = Vec::new();
    let mut file_guards = Vec::new();

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .with_filter(EnvFilter::new(&filter));
    layers.push(console_layer.boxed());

    for crate_name in KNOWN_CRATES {
        let file_appender = rolling::daily(&run_folder, format!("{crate_name}.log"));
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        file_guards.push(guard);

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_target(true)
            .json()
            .with_filter(EnvFilter::new(format!("{crate_name}=debug")))
            .boxed();
        layers.push(file_layer);
    }

    let combined_appender = rolling::daily(&run_folder, "vpm.log");
    let (combined_non_blocking, combined_guard) = tracing_appender::non_blocking(combined_appender);
    file_guards.push(combined_guard);
    let combined_layer = tracing_subscriber::fmt::layer()
        .with_writer(combined_non_blocking)
        .with_target(true)
        .json()
        .with_filter(EnvFilter::new(&filter))
        .boxed();
    layers.push(combined_layer);

    Registry::default().with(layers).init();

    Ok(LoggingGuard { _file_guards: file_guards, log_dir: run_folder })
}

/// Remove all but the most recent `retention_runs` run folders. Folder names
/// embed the timestamp, so lexicographic order is chronological.
fn cleanup_old_runs(base_log_dir: &Path, retention_runs: usize) -> Result<()> {
    if !base_log_dir.exists() {
        return Ok(());
    }
    let mut runs: Vec<PathBuf> = std::fs::read_dir(base_log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("run_"))
        })
        .collect();
    runs.sort();

    if runs.len() > retention_runs {
        let excess = runs.len() - retention_runs;
        for path in runs.iter().take(excess) {
            if let Err(e) = std::fs::remove_dir_all(path) {
                eprintln!("Warning: failed to remove old log directory {}: {e}", path.display());
            }
        }
    }
    Ok(())
}

/// Initialize logging with default settings.
pub fn init_logging_default(debug_flags: &DebugFlags) -> Result<LoggingGuard> {
    init_logging(debug_flags, None, None)
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Process-tag lookup through the vendor scheduler node.
//!
//! The kernel endpoint classifies a thread-group id when its decimal string
//! is written to it; the write's accepted length encodes the tag. The
//! endpoint is opened once and reused under a mutex.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{error, warn};

const TYPE_CHECK_NODE_PATH: &str = "/proc/vendor_sched/check_tgid_type";

/// Scheduler classification of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessTag {
    Default,
    SystemUi,
    Chrome,
}

pub struct TgidTypeChecker {
    file: Mutex<Option<File>>,
}

impl TgidTypeChecker {
    pub fn new() -> Self {
        Self::with_path(Path::new(TYPE_CHECK_NODE_PATH))
    }

    /// Open the checker over an explicit endpoint (tests).
    pub fn with_path(path: &Path) -> Self {
        if !path.exists() {
            warn!(path = %path.display(), "can't find vendor node");
            return Self { file: Mutex::new(None) };
        }
        let file = match OpenOptions::new().write(true).truncate(true).open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to open the node");
                None
            }
        };
        Self { file: Mutex::new(file) }
    }

    pub fn is_valid(&self) -> bool {
        self.file.lock().is_some()
    }

    /// Classify `tgid`; unknown or unavailable endpoints map to `Default`.
    pub fn process_tag(&self, tgid: i32) -> ProcessTag {
        let mut guard = self.file.lock();
        let Some(file) = guard.as_mut() else {
            warn!("invalid tgid type checker, skipping the check");
            return ProcessTag::Default;
        };
        let value = tgid.to_string();
        match file.write(value.as_bytes()) {
            Ok(1) => ProcessTag::SystemUi,
            Ok(2) => ProcessTag::Chrome,
            _ => ProcessTag::Default,
        }
    }
}

impl Default for TgidTypeChecker {
    fn default() -> Self {
        Self::new()
    }
}

static CHECKER: Lazy<TgidTypeChecker> = Lazy::new(TgidTypeChecker::new);

/// Shared process-wide checker.
pub fn instance() -> &'static TgidTypeChecker {
    &CHECKER
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_endpoint_yields_default_tag() {
        let checker = TgidTypeChecker::with_path(Path::new("/nonexistent/check_tgid_type"));
        assert!(!checker.is_valid());
        assert_eq!(checker.process_tag(1234), ProcessTag::Default);
    }

    #[test]
    fn regular_file_accepts_full_write_and_stays_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("check_tgid_type");
        std::fs::write(&path, "").unwrap();
        let checker = TgidTypeChecker::with_path(&path);
        assert!(checker.is_valid());
        // A plain file accepts the whole string, which is neither tag code.
        assert_eq!(checker.process_tag(1234), ProcessTag::Default);
    }
}

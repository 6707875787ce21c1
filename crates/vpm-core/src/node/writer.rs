// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Write back-ends for tunable nodes.
//!
//! A [`Node`](super::Node) is generic over this capability so the dispatcher
//! never cares whether an endpoint is a sysfs file, a process property or an
//! in-memory sink used by tests.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::properties;

/// Write/read capability of a node endpoint.
pub trait NodeWriter: Send {
    /// Replace the endpoint's content with `value`.
    fn write_value(&mut self, value: &str) -> io::Result<()>;

    /// Current endpoint content, when the back-end supports reads.
    fn read_value(&mut self) -> Option<String>;

    /// Human-readable endpoint description for dumps.
    fn describe(&self) -> String;
}

/// Sysfs-style file endpoint. The file is opened once; every write rewinds
/// and truncates so the endpoint always holds exactly the last value.
pub struct FileNode {
    path: PathBuf,
    file: File,
}

impl FileNode {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().write(true).create(true).open(&path)?;
        Ok(Self { path, file })
    }
}

impl NodeWriter for FileNode {
    fn write_value(&mut self, value: &str) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.set_len(0)?;
        self.file.write_all(value.as_bytes())?;
        self.file.flush()
    }

    fn read_value(&mut self) -> Option<String> {
        std::fs::read_to_string(&self.path)
            .ok()
            .map(|s| s.trim_end().to_string())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// Endpoint backed by the process-global property store.
pub struct PropertyNode {
    key: String,
}

impl PropertyNode {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl NodeWriter for PropertyNode {
    fn write_value(&mut self, value: &str) -> io::Result<()> {
        properties::set(&self.key, value);
        Ok(())
    }

    fn read_value(&mut self) -> Option<String> {
        properties::get_raw(&self.key)
    }

    fn describe(&self) -> String {
        format!("property:{}", self.key)
    }
}

/// In-memory endpoint capturing writes for assertions.
///
/// Cloning shares the underlying buffer, so tests keep a handle while the
/// node owns the writer. `fail_next_writes` poisons the sink to exercise the
/// retry-on-next-pass path.
#[derive(Clone, Default)]
pub struct TestNode {
    inner: Arc<Mutex<TestNodeState>>,
}

#[derive(Default)]
struct TestNodeState {
    writes: Vec<(Instant, String)>,
    fail_remaining: usize,
}

impl TestNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(timestamp, value)` pair written so far.
    pub fn writes(&self) -> Vec<(Instant, String)> {
        self.inner.lock().writes.clone()
    }

    /// Written values, in order.
    pub fn values(&self) -> Vec<String> {
        self.inner.lock().writes.iter().map(|(_, v)| v.clone()).collect()
    }

    pub fn last_value(&self) -> Option<String> {
        self.inner.lock().writes.last().map(|(_, v)| v.clone())
    }

    /// Make the next `n` writes fail with an I/O error.
    pub fn fail_next_writes(&self, n: usize) {
        self.inner.lock().fail_remaining = n;
    }
}

impl NodeWriter for TestNode {
    fn write_value(&mut self, value: &str) -> io::Result<()> {
        let mut state = self.inner.lock();
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "test sink poisoned"));
        }
        state.writes.push((Instant::now(), value.to_string()));
        Ok(())
    }

    fn read_value(&mut self) -> Option<String> {
        self.last_value()
    }

    fn describe(&self) -> String {
        "test".to_string()
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Structured trace events around enqueue, dequeue and node updates.
//!
//! The dispatcher emits begin/end/instant events with a stable label scheme
//! (`enq:+<hint>`, `deq:<hint>:±`, `<node>:enable|disable|prop:disabled`).
//! Events are delivered to an installable sink; no semantic behaviour depends
//! on whether one is attached.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

/// Kind of a trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// Opens a labelled span.
    Begin,
    /// Closes the most recent span.
    End,
    /// Standalone point event.
    Instant,
}

/// Receiver for trace events. Implementations must be cheap; the dispatcher
/// calls this on its hot path.
pub trait TraceSink: Send + Sync {
    fn event(&self, kind: TraceKind, label: &str, kv: &[(&str, &str)]);
}

static SINK: Lazy<RwLock<Option<Arc<dyn TraceSink>>>> = Lazy::new(|| RwLock::new(None));

/// Install a process-wide trace sink, replacing any previous one.
pub fn install_sink(sink: Arc<dyn TraceSink>) {
    *SINK.write() = Some(sink);
}

/// Remove the installed sink.
pub fn clear_sink() {
    *SINK.write() = None;
}

fn emit(kind: TraceKind, label: &str, kv: &[(&str, &str)]) {
    if let Some(sink) = SINK.read().as_ref() {
        sink.event(kind, label, kv);
    }
}

/// Emit a begin event.
pub fn begin(label: &str) {
    emit(TraceKind::Begin, label, &[]);
}

/// Emit an end event.
pub fn end() {
    emit(TraceKind::End, "", &[]);
}

/// Emit a point event.
pub fn instant(label: &str) {
    emit(TraceKind::Instant, label, &[]);
}

/// Emit a point event with key/value payload.
pub fn instant_kv(label: &str, kv: &[(&str, &str)]) {
    emit(TraceKind::Instant, label, kv);
}

/// RAII span: begin on construction, end on drop.
pub struct TraceScope;

impl TraceScope {
    pub fn enter(label: &str) -> Self {
        begin(label);
        TraceScope
    }
}

impl Drop for TraceScope {
    fn drop(&mut self) {
        end();
    }
}

/// Sink that records events in memory, for tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(TraceKind, String)>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<(TraceKind, String)> {
        std::mem::take(&mut self.events.lock())
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().iter().map(|(_, l)| l.clone()).collect()
    }
}

impl TraceSink for RecordingSink {
    fn event(&self, kind: TraceKind, label: &str, _kv: &[(&str, &str)]) {
        self.events.lock().push((kind, label.to_string()));
    }
}

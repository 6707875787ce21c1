// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-session frame statistics.
//!
//! Two shapes of frame data feed the same session record: bucketized app
//! jank counts, and full game frame-timing histograms used to derive FPS
//! distributions.

use std::fmt;
use std::io::{self, Write};
use std::time::SystemTime;

/// Histogram width for game frame timings, in milliseconds.
pub const TIME_BUCKETS_SIZE: usize = 100;

/// Non-game app jank frames grouped by duration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameBuckets {
    pub total_frames: i64,
    pub frames_17_to_25_ms: i64,
    pub frames_25_to_34_ms: i64,
    pub frames_34_to_67_ms: i64,
    pub frames_67_to_100_ms: i64,
    pub frames_over_100_ms: i64,
}

impl FrameBuckets {
    pub fn add_up(&mut self, new_frames: &FrameBuckets) {
        self.total_frames += new_frames.total_frames;
        self.frames_17_to_25_ms += new_frames.frames_17_to_25_ms;
        self.frames_25_to_34_ms += new_frames.frames_25_to_34_ms;
        self.frames_34_to_67_ms += new_frames.frames_34_to_67_ms;
        self.frames_67_to_100_ms += new_frames.frames_67_to_100_ms;
        self.frames_over_100_ms += new_frames.frames_over_100_ms;
    }

    fn percent(count: i64, total: i64) -> f64 {
        (count * 10_000 / total) as f64 / 100.0
    }
}

impl fmt::Display for FrameBuckets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JankFramesInBuckets: ")?;
        if self.total_frames <= 0 {
            return write!(f, "0%-0%-0%-0%-0%-0");
        }
        let buckets = [
            self.frames_17_to_25_ms,
            self.frames_25_to_34_ms,
            self.frames_34_to_67_ms,
            self.frames_67_to_100_ms,
            self.frames_over_100_ms,
        ];
        for (i, count) in buckets.iter().enumerate() {
            if i > 0 {
                write!(f, "-")?;
            }
            write!(f, "{}%", Self::percent(*count, self.total_frames))?;
            if *count > 0 {
                write!(f, "({count})")?;
            }
        }
        write!(f, "-{}", self.total_frames)
    }
}

/// Accumulated game frame histograms.
#[derive(Debug, Clone)]
pub struct GameFrameMetrics {
    /// Frame-duration histogram, one bucket per millisecond.
    pub frame_timing_ms: Vec<u32>,
    /// Frame-to-frame delta histogram for jitter distribution.
    pub frame_timing_delta_ms: Vec<u32>,
    /// Total time across frames, for the session-average FPS.
    pub total_frame_time_ms: u64,
    pub num_frames: u32,
}

impl Default for GameFrameMetrics {
    fn default() -> Self {
        Self {
            frame_timing_ms: vec![0; TIME_BUCKETS_SIZE],
            frame_timing_delta_ms: vec![0; TIME_BUCKETS_SIZE],
            total_frame_time_ms: 0,
            num_frames: 0,
        }
    }
}

/// A batch of raw game frame observations to fold into the session.
#[derive(Debug, Clone, Default)]
pub struct GameFrameSample {
    pub frame_durations_ms: Vec<i64>,
    pub frame_deltas_ms: Vec<i64>,
    pub total_frame_time_ms: u64,
    pub num_frames: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioType {
    Default,
    Game,
}

impl fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScenarioType::Default => write!(f, "DEFAULT"),
            ScenarioType::Game => write!(f, "GAME"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTimelineType {
    SurfaceFlinger,
    App,
}

impl fmt::Display for FrameTimelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameTimelineType::SurfaceFlinger => write!(f, "SURFACEFLINGER"),
            FrameTimelineType::App => write!(f, "APP"),
        }
    }
}

/// One session's frame statistics.
pub struct SessionMetrics {
    pub uid: Option<i32>,
    pub scenario_type: ScenarioType,
    pub frame_timeline_type: FrameTimelineType,
    pub completed: bool,
    pub total_frame_number: u64,
    pub start_time: SystemTime,
    pub end_time: Option<SystemTime>,
    app_frame_metrics: Option<FrameBuckets>,
    game_frame_metrics: Option<GameFrameMetrics>,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self {
            uid: None,
            scenario_type: ScenarioType::Default,
            frame_timeline_type: FrameTimelineType::App,
            completed: false,
            total_frame_number: 0,
            start_time: SystemTime::now(),
            end_time: None,
            app_frame_metrics: None,
            game_frame_metrics: None,
        }
    }
}

impl SessionMetrics {
    /// Begin a fresh collection interval for the given scenario.
    pub fn reset_metric(&mut self, scenario: ScenarioType) {
        self.scenario_type = scenario;
        self.completed = false;
        self.total_frame_number = 0;
        self.start_time = SystemTime::now();
        self.end_time = None;
        self.app_frame_metrics = None;
        self.game_frame_metrics = None;
    }

    pub fn complete(&mut self) {
        self.completed = true;
        self.end_time = Some(SystemTime::now());
    }

    /// Fold a batch of game frames into the histograms.
    ///
    /// Outliers land in the last bucket; their excess over the histogram
    /// width is deducted from the total time so the session-average FPS is
    /// not dominated by a few stalls.
    pub fn add_game_frames(&mut self, sample: &GameFrameSample) {
        let metrics = self.game_frame_metrics.get_or_insert_with(GameFrameMetrics::default);
        metrics.total_frame_time_ms += sample.total_frame_time_ms;
        metrics.num_frames += sample.num_frames;
        self.total_frame_number += u64::from(sample.num_frames);

        for &duration in &sample.frame_durations_ms {
            if duration >= TIME_BUCKETS_SIZE as i64 {
                metrics.frame_timing_ms[TIME_BUCKETS_SIZE - 1] += 1;
                metrics.total_frame_time_ms = metrics
                    .total_frame_time_ms
                    .saturating_sub((duration - TIME_BUCKETS_SIZE as i64) as u64);
            } else if duration >= 0 {
                metrics.frame_timing_ms[duration as usize] += 1;
            }
        }
        for &delta in &sample.frame_deltas_ms {
            if delta >= TIME_BUCKETS_SIZE as i64 {
                metrics.frame_timing_delta_ms[TIME_BUCKETS_SIZE - 1] += 1;
            } else if delta >= 0 {
                metrics.frame_timing_delta_ms[delta as usize] += 1;
            }
        }
    }

    /// Fold bucketized app frames into the session.
    pub fn add_app_frames(&mut self, new_frames: &FrameBuckets) {
        self.total_frame_number += new_frames.total_frames.max(0) as u64;
        match &mut self.app_frame_metrics {
            Some(existing) => existing.add_up(new_frames),
            None => self.app_frame_metrics = Some(*new_frames),
        }
    }

    pub fn game_frame_metrics(&self) -> Option<&GameFrameMetrics> {
        self.game_frame_metrics.as_ref()
    }

    pub fn app_frame_metrics(&self) -> Option<&FrameBuckets> {
        self.app_frame_metrics.as_ref()
    }

    /// Session-average FPS, or `None` before any game frame arrived.
    pub fn average_fps(&self) -> Option<f64> {
        let metrics = self.game_frame_metrics.as_ref()?;
        if metrics.total_frame_time_ms == 0 {
            return None;
        }
        Some(f64::from(metrics.num_frames) * 1000.0 / metrics.total_frame_time_ms as f64)
    }

    pub fn dump(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(
            w,
            "Session uid: {}, Scenario: {}, FrameTimelineType: {}",
            self.uid.unwrap_or(-1),
            self.scenario_type,
            self.frame_timeline_type
        )?;
        if let Some(app) = &self.app_frame_metrics {
            writeln!(w, "    {app}")?;
        }
        if let Some(game) = &self.game_frame_metrics {
            write!(w, "    frameTimingHistogram: [")?;
            dump_histogram(w, &game.frame_timing_ms)?;
            writeln!(w, "]")?;
            write!(w, "    frameTimingDeltaHistogram: [")?;
            dump_histogram(w, &game.frame_timing_delta_ms)?;
            writeln!(w, "]")?;
            writeln!(w, "    Average FPS: {}", self.average_fps().unwrap_or(-1.0))?;
            writeln!(w, "    Total number of frames: {}", game.num_frames)?;
        }
        Ok(())
    }
}

fn dump_histogram(w: &mut dyn Write, histogram: &[u32]) -> io::Result<()> {
    let mut first = true;
    for (bucket, count) in histogram.iter().enumerate() {
        if *count > 0 {
            if !first {
                write!(w, ", ")?;
            }
            write!(w, "{bucket}:{count}")?;
            first = false;
        }
    }
    Ok(())
}

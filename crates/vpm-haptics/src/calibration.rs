// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-unit actuator calibration.
//!
//! Calibration values are produced on the factory line and persisted as
//! `key value` lines. Resonant frequency, Q factor and coil resistance are
//! fixed point: Q10.14, Q8.16 and Q7.17 respectively (see the LRA
//! calibration support documentation).

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use tracing::warn;

use vpm_core::properties;

pub const Q14_BIT_SHIFT: u32 = 14;
pub const Q16_BIT_SHIFT: u32 = 16;
pub const Q17_BIT_SHIFT: u32 = 17;

const Q_FLOAT_TO_FIXED: u32 = 1 << Q16_BIT_SHIFT;
const Q_INDEX_TO_FIXED: u32 = (1.5 * Q_FLOAT_TO_FIXED as f64) as u32;
const Q_INDEX_OFFSET: u32 = 2 * Q_FLOAT_TO_FIXED;

const VERSION_DEFAULT: u32 = 1;
const DEFAULT_FREQUENCY_SHIFT: i32 = 0;
const DEFAULT_DEVICE_MASS: f32 = 0.21;
const DEFAULT_LOC_COEFF: f32 = 0.5;
const Q_DEFAULT: u32 = (15.5 * Q_FLOAT_TO_FIXED as f64) as u32;
const V_LEVELS_DEFAULT: [u32; 6] = [60, 70, 80, 90, 100, 76];
const V_TICK_DEFAULT: [u32; 2] = [10, 70];
const V_CLICK_DEFAULT: [u32; 2] = [10, 70];
const V_LONG_DEFAULT: [u32; 2] = [10, 70];

const CHIRP_ENABLE_PROPERTY: &str = "persist.vendor.vibrator.hal.chirp.enabled";

/// Convert a Q10.14 resonant frequency reading to hertz.
pub fn f0_to_hz(raw: u32) -> f32 {
    raw as f32 / (1 << Q14_BIT_SHIFT) as f32
}

/// Convert a Q8.16 quality factor reading to a plain float.
pub fn q_to_float(raw: u32) -> f32 {
    raw as f32 / (1 << Q16_BIT_SHIFT) as f32
}

/// Convert a Q7.17 coil resistance reading to ohms.
pub fn redc_to_ohms(raw: u32) -> f32 {
    raw as f32 * 5.857 / (1 << Q17_BIT_SHIFT) as f32
}

/// Calibration access consumed by the runtime.
pub trait HwCal: Send {
    fn version(&self) -> u32;
    fn f0(&self) -> Option<u32>;
    fn redc(&self) -> Option<u32>;
    fn q(&self) -> u32;
    fn vol_levels(&self) -> [u32; 6];
    fn tick_vol_levels(&self) -> [u32; 2];
    fn click_vol_levels(&self) -> [u32; 2];
    fn long_vol_levels(&self) -> [u32; 2];
    fn long_frequency_shift(&self) -> i32;
    fn device_mass(&self) -> f32;
    fn loc_coeff(&self) -> f32;
    fn is_chirp_enabled(&self) -> bool;
    /// Discrete `frequency -> max level` chirp limit points; empty when the
    /// device carries no limit document.
    fn pwle_limit_points(&self) -> Vec<(f32, f32)>;
    /// Fill level for bins the limit points do not cover.
    fn pwle_limit_default_level(&self) -> f32;
    fn debug(&self, w: &mut dyn Write) -> io::Result<()>;
}

/// Calibration table with per-field defaults matching the factory fallbacks.
#[derive(Debug, Clone)]
pub struct CalTable {
    pub version: u32,
    pub f0: Option<u32>,
    pub redc: Option<u32>,
    pub q: Option<u32>,
    pub q_index: Option<u32>,
    pub vol_levels: Option<[u32; 6]>,
    pub tick_vol_levels: Option<[u32; 2]>,
    pub click_vol_levels: Option<[u32; 2]>,
    pub long_vol_levels: Option<[u32; 2]>,
    pub long_frequency_shift: i32,
    pub device_mass: f32,
    pub loc_coeff: f32,
    pub pwle_limit_points: Vec<(f32, f32)>,
    pub pwle_limit_default_level: f32,
}

impl Default for CalTable {
    fn default() -> Self {
        Self {
            version: VERSION_DEFAULT,
            f0: None,
            redc: None,
            q: None,
            q_index: None,
            vol_levels: None,
            tick_vol_levels: None,
            click_vol_levels: None,
            long_vol_levels: None,
            long_frequency_shift: DEFAULT_FREQUENCY_SHIFT,
            device_mass: DEFAULT_DEVICE_MASS,
            loc_coeff: DEFAULT_LOC_COEFF,
            pwle_limit_points: Vec::new(),
            pwle_limit_default_level: 1.0,
        }
    }
}

impl CalTable {
    /// Parse `key value` lines from a persisted calibration file. Unknown
    /// keys are ignored; malformed values fall back to defaults with a
    /// warning.
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = std::fs::File::open(path)?;
        let mut entries = HashMap::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(char::is_whitespace) {
                entries.insert(key.to_string(), value.trim().to_string());
            }
        }
        Ok(Self::from_entries(&entries))
    }

    fn from_entries(entries: &HashMap<String, String>) -> Self {
        let mut table = Self::default();
        table.version = parse(entries, "version").unwrap_or(VERSION_DEFAULT);
        table.f0 = parse(entries, "f0_measured");
        table.redc = parse(entries, "redc_measured");
        table.q = parse(entries, "q_measured");
        table.q_index = parse(entries, "q_index");
        table.vol_levels = parse_array(entries, "v_levels");
        table.tick_vol_levels = parse_array(entries, "v_tick");
        table.click_vol_levels = parse_array(entries, "v_click");
        table.long_vol_levels = parse_array(entries, "v_long");
        table.long_frequency_shift =
            parse(entries, "long.frequency.shift").unwrap_or(DEFAULT_FREQUENCY_SHIFT);
        table.device_mass = parse(entries, "device.mass").unwrap_or(DEFAULT_DEVICE_MASS);
        table.loc_coeff = parse(entries, "loc.coeff").unwrap_or(DEFAULT_LOC_COEFF);
        table
    }
}

fn parse<T: std::str::FromStr>(entries: &HashMap<String, String>, key: &str) -> Option<T> {
    let raw = entries.get(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, raw = %raw, "unparsable calibration entry");
            None
        }
    }
}

fn parse_array<const N: usize>(entries: &HashMap<String, String>, key: &str) -> Option<[u32; N]> {
    let raw = entries.get(key)?;
    let mut out = [0u32; N];
    let mut count = 0;
    for (slot, token) in out.iter_mut().zip(raw.split_whitespace()) {
        *slot = token.parse().ok()?;
        count += 1;
    }
    if count == N {
        Some(out)
    } else {
        warn!(key, raw = %raw, "short calibration array");
        None
    }
}

impl HwCal for CalTable {
    fn version(&self) -> u32 {
        self.version
    }

    fn f0(&self) -> Option<u32> {
        self.f0
    }

    fn redc(&self) -> Option<u32> {
        self.redc
    }

    fn q(&self) -> u32 {
        if let Some(q) = self.q {
            return q;
        }
        if let Some(index) = self.q_index {
            return index * Q_INDEX_TO_FIXED + Q_INDEX_OFFSET;
        }
        Q_DEFAULT
    }

    fn vol_levels(&self) -> [u32; 6] {
        self.vol_levels.unwrap_or(V_LEVELS_DEFAULT)
    }

    fn tick_vol_levels(&self) -> [u32; 2] {
        self.tick_vol_levels.unwrap_or(V_TICK_DEFAULT)
    }

    fn click_vol_levels(&self) -> [u32; 2] {
        self.click_vol_levels.unwrap_or(V_CLICK_DEFAULT)
    }

    fn long_vol_levels(&self) -> [u32; 2] {
        self.long_vol_levels.unwrap_or(V_LONG_DEFAULT)
    }

    fn long_frequency_shift(&self) -> i32 {
        self.long_frequency_shift
    }

    fn device_mass(&self) -> f32 {
        self.device_mass
    }

    fn loc_coeff(&self) -> f32 {
        self.loc_coeff
    }

    fn is_chirp_enabled(&self) -> bool {
        properties::get_bool(CHIRP_ENABLE_PROPERTY, false)
    }

    fn pwle_limit_points(&self) -> Vec<(f32, f32)> {
        self.pwle_limit_points.clone()
    }

    fn pwle_limit_default_level(&self) -> f32 {
        self.pwle_limit_default_level
    }

    fn debug(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "Calibration:")?;
        writeln!(w, "  version: {}", self.version)?;
        writeln!(w, "  f0_measured: {:?}", self.f0)?;
        writeln!(w, "  redc_measured: {:?}", self.redc)?;
        writeln!(w, "  q: {}", self.q())?;
        writeln!(w, "  v_tick: {:?}", self.tick_vol_levels())?;
        writeln!(w, "  v_click: {:?}", self.click_vol_levels())?;
        writeln!(w, "  v_long: {:?}", self.long_vol_levels())?;
        writeln!(w, "  device.mass: {}", self.device_mass)?;
        writeln!(w, "  loc.coeff: {}", self.loc_coeff)
    }
}

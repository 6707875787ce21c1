// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bandwidth → amplitude map.
//!
//! Each of the 271 one-hertz bins between 30 and 300 Hz holds the maximum
//! safe normalized amplitude at that carrier frequency. The map combines the
//! device's discrete chirp limit curve with the acceleration response of the
//! driver/LRA system derived from per-unit calibration.

use tracing::error;

use crate::calibration::{redc_to_ohms, HwCal};
use crate::primitives::{
    PWLE_BW_MAP_SIZE, PWLE_FREQUENCY_MIN_HZ, PWLE_FREQUENCY_RESOLUTION_HZ, VOLTAGE_SCALE_MAX,
};

// System constants recommended by the driver vendor.
const Q_FACTOR: f32 = 10.0;
const BL_SYS: f32 = 1.1;
const GRAVITY: f32 = 9.81;
const MAX_VOLTAGE: f32 = 12.3;

/// Interpolate the discrete `frequency -> max level` points across all bins.
/// Bins outside the covered span keep `default_level`.
pub fn interpolate_limit_curve(points: &[(f32, f32)], default_level: f32) -> [f32; PWLE_BW_MAP_SIZE] {
    let mut map = [default_level; PWLE_BW_MAP_SIZE];
    if points.is_empty() {
        return map;
    }

    let bin = |freq: f32| -> usize {
        let idx = (freq - PWLE_FREQUENCY_MIN_HZ) / PWLE_FREQUENCY_RESOLUTION_HZ;
        (idx.round() as usize).min(PWLE_BW_MAP_SIZE - 1)
    };

    if points.len() == 1 {
        map[bin(points[0].0)] = points[0].1;
        return map;
    }

    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, y1) = pair[1];
        let start = bin(x0);
        let end = bin(x1);
        for idx in start..=end {
            let xp = PWLE_FREQUENCY_MIN_HZ + idx as f32 * PWLE_FREQUENCY_RESOLUTION_HZ;
            map[idx] = y0 + ((y1 - y0) / (x1 - x0)) * (xp - x0);
        }
    }
    map
}

/// Normalized maximum safe amplitude per frequency bin.
#[derive(Debug, Clone)]
pub struct BandwidthAmplitudeMap {
    levels: Vec<f32>,
}

impl BandwidthAmplitudeMap {
    /// Build directly from precomputed levels (tests, dump replay).
    pub fn from_levels(levels: Vec<f32>) -> Option<Self> {
        if levels.len() == PWLE_BW_MAP_SIZE {
            Some(Self { levels })
        } else {
            None
        }
    }

    /// Derive the map from calibration.
    ///
    /// The acceleration of the spring/mass system driven at `f` is
    /// `a(f) = (V·Bl·k / R / m) · ω² / |P(ω)| / g` with
    /// `|P(ω)| = sqrt((ωn² − ω²)² + (ωn·ω/Q)²)`; the curve is normalized to
    /// its own maximum, floored to two decimals, and clipped bin-by-bin to
    /// the chirp limit curve. Returns `None` when calibration lacks the
    /// device mass, location coefficient or coil resistance.
    pub fn generate(
        cal: &dyn HwCal,
        resonant_frequency_hz: f32,
        long_vol_max: u32,
        limit: &[f32; PWLE_BW_MAP_SIZE],
    ) -> Option<Self> {
        let device_mass = cal.device_mass();
        let loc_coeff = cal.loc_coeff();
        if device_mass == 0.0 || loc_coeff == 0.0 {
            error!(device_mass, loc_coeff, "missing device mass or loc coeff");
            return None;
        }
        let Some(redc) = cal.redc() else {
            error!("missing redc calibration");
            return None;
        };
        let r_sys = redc_to_ohms(redc);
        let wn_sys = resonant_frequency_hz * 2.0 * std::f32::consts::PI;
        let vol_scale = long_vol_max as f32 / VOLTAGE_SCALE_MAX as f32;

        let mut levels = vec![0.0f32; PWLE_BW_MAP_SIZE];
        let mut max_accel = 0.0f32;
        for (i, level) in levels.iter_mut().enumerate() {
            let frequency_hz = PWLE_FREQUENCY_MIN_HZ + i as f32 * PWLE_FREQUENCY_RESOLUTION_HZ;
            let omega = frequency_hz * 2.0 * std::f32::consts::PI;
            let v_sys = vol_scale * MAX_VOLTAGE * limit[i];

            let var1 = (wn_sys.powi(2) - omega.powi(2)).powi(2);
            let var2 = (wn_sys * omega / Q_FACTOR).powi(2);
            let p_sys_abs = (var1 + var2).sqrt();

            let accel = (v_sys * BL_SYS * loc_coeff / r_sys / device_mass) * omega.powi(2)
                / p_sys_abs
                / GRAVITY;
            if accel > max_accel {
                max_accel = accel;
            }
            *level = accel;
        }
        if max_accel <= 0.0 {
            return None;
        }
        for (level, cap) in levels.iter_mut().zip(limit.iter()) {
            *level = ((*level / max_accel) * 100.0).floor() / 100.0;
            *level = level.min(*cap);
        }
        Some(Self { levels })
    }

    /// Maximum safe level at `frequency_hz`, or `None` outside the band.
    pub fn level_at(&self, frequency_hz: f32) -> Option<f32> {
        let idx = (frequency_hz - PWLE_FREQUENCY_MIN_HZ) / PWLE_FREQUENCY_RESOLUTION_HZ;
        if idx < 0.0 {
            return None;
        }
        self.levels.get(idx.round() as usize).copied()
    }

    pub fn levels(&self) -> &[f32] {
        &self.levels
    }
}

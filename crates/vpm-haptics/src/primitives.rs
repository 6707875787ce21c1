// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Effect vocabulary and device waveform constants.
//!
//! Waveform indices identify patterns preloaded on the actuator DSP. Indices
//! above [`BASE_CONTINUOUS_EFFECT_OFFSET`] select the continuous bank.

/// Offset of the continuous waveform bank.
pub const BASE_CONTINUOUS_EFFECT_OFFSET: u32 = 32768;

/// Long vibrations play the looped waveform at index 0.
pub const WAVEFORM_LONG_VIBRATION_EFFECT_INDEX: u32 = 0;
/// Vibrations shorter than this play the one-shot continuous waveform.
pub const WAVEFORM_LONG_VIBRATION_THRESHOLD_MS: u32 = 50;
pub const WAVEFORM_SHORT_VIBRATION_EFFECT_INDEX: u32 = 3 + BASE_CONTINUOUS_EFFECT_OFFSET;

pub const WAVEFORM_CLICK_INDEX: u32 = 2;
pub const WAVEFORM_THUD_INDEX: u32 = 4;
pub const WAVEFORM_SPIN_INDEX: u32 = 5;
pub const WAVEFORM_QUICK_RISE_INDEX: u32 = 6;
pub const WAVEFORM_SLOW_RISE_INDEX: u32 = 7;
pub const WAVEFORM_QUICK_FALL_INDEX: u32 = 8;
pub const WAVEFORM_LIGHT_TICK_INDEX: u32 = 9;
pub const WAVEFORM_LOW_TICK_INDEX: u32 = 10;

/// Plays whatever sits in the unsaved (PWLE) trigger slot.
pub const WAVEFORM_UNSAVED_TRIGGER_QUEUE_INDEX: u32 = 65529;
/// Plays the saved effect queue.
pub const WAVEFORM_TRIGGER_QUEUE_INDEX: u32 = 65534;

pub const WAVEFORM_DOUBLE_CLICK_SILENCE_MS: u32 = 100;

/// I2C transaction + DSP return-from-standby.
pub const MAX_COLD_START_LATENCY_MS: u32 = 6;
/// ALERT irq handling budget per queued pause.
pub const MAX_PAUSE_TIMING_ERROR_MS: u32 = 1;
pub const MAX_TIME_MS: u32 = u32::MAX;

pub const VOLTAGE_SCALE_MAX: u32 = 100;
pub const AMP_ATTENUATE_STEP_SIZE: f32 = 0.125;
/// Effect sample clock, samples per millisecond.
pub const EFFECT_FREQUENCY_KHZ: f32 = 48.0;

pub const COMPOSE_DELAY_MAX_MS: u32 = 10_000;
pub const COMPOSE_SIZE_MAX: usize = 127;
pub const COMPOSE_PWLE_SIZE_LIMIT: u32 = 82;
/// The PWLE sysfs node rejects strings longer than this.
pub const PWLE_LENGTH_MAX: usize = 4094;
pub const COMPOSE_PWLE_PRIMITIVE_DURATION_MAX_MS: i32 = 999;

pub const PWLE_LEVEL_MIN: f32 = 0.0;
pub const PWLE_LEVEL_MAX: f32 = 1.0;
/// Hard device clip below full scale.
pub const PWLE_LEVEL_LIMIT: f32 = 0.99;
pub const PWLE_FREQUENCY_RESOLUTION_HZ: f32 = 1.0;
pub const PWLE_FREQUENCY_MIN_HZ: f32 = 30.0;
pub const PWLE_FREQUENCY_MAX_HZ: f32 = 300.0;
/// `1 + (300 - 30) / 1`: one bin per hertz across the supported band.
pub const PWLE_BW_MAP_SIZE: usize = 271;
pub const RESONANT_FREQUENCY_DEFAULT: f32 = 145.0;

pub const RAMP_DOWN_CONSTANT: f32 = 1048.576;
pub const RAMP_DOWN_TIME_MS: f32 = 0.0;

/// Classic one-shot effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    TextureTick,
    Tick,
    Click,
    HeavyClick,
    DoubleClick,
}

/// Strength requested alongside a classic effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectStrength {
    Light,
    Medium,
    Strong,
}

impl EffectStrength {
    /// Base intensity for the strength level.
    pub fn intensity(self) -> f32 {
        match self {
            EffectStrength::Light => 0.5,
            EffectStrength::Medium => 0.7,
            EffectStrength::Strong => 1.0,
        }
    }
}

/// Primitives available for composition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositePrimitive {
    Noop,
    Click,
    Thud,
    Spin,
    QuickRise,
    SlowRise,
    QuickFall,
    LightTick,
    LowTick,
}

impl CompositePrimitive {
    /// Device waveform index; `None` for the no-op primitive.
    pub fn effect_index(self) -> Option<u32> {
        match self {
            CompositePrimitive::Noop => None,
            CompositePrimitive::Click => Some(WAVEFORM_CLICK_INDEX),
            CompositePrimitive::Thud => Some(WAVEFORM_THUD_INDEX),
            CompositePrimitive::Spin => Some(WAVEFORM_SPIN_INDEX),
            CompositePrimitive::QuickRise => Some(WAVEFORM_QUICK_RISE_INDEX),
            CompositePrimitive::SlowRise => Some(WAVEFORM_SLOW_RISE_INDEX),
            CompositePrimitive::QuickFall => Some(WAVEFORM_QUICK_FALL_INDEX),
            CompositePrimitive::LightTick => Some(WAVEFORM_LIGHT_TICK_INDEX),
            CompositePrimitive::LowTick => Some(WAVEFORM_LOW_TICK_INDEX),
        }
    }

    pub fn all() -> &'static [CompositePrimitive] {
        &[
            CompositePrimitive::Noop,
            CompositePrimitive::Click,
            CompositePrimitive::Thud,
            CompositePrimitive::Spin,
            CompositePrimitive::QuickRise,
            CompositePrimitive::SlowRise,
            CompositePrimitive::QuickFall,
            CompositePrimitive::LightTick,
            CompositePrimitive::LowTick,
        ]
    }
}

/// Deceleration modes the DSP supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Braking {
    None,
    Clab,
}

impl Braking {
    pub fn code(self) -> u32 {
        match self {
            Braking::None => 0,
            Braking::Clab => 1,
        }
    }
}

/// One segment of a composition request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HapticPrimitive {
    /// Pause only.
    Delay { duration_ms: u32 },
    /// Preloaded primitive scaled into `[0, 1]`.
    Effect { primitive: CompositePrimitive, scale: f32 },
    /// Piecewise-linear amplitude/frequency segment.
    Active {
        duration_ms: i32,
        start_amplitude: f32,
        end_amplitude: f32,
        start_frequency_hz: f32,
        end_frequency_hz: f32,
    },
    /// Deceleration segment.
    Braking { duration_ms: i32, braking: Braking },
}

impl HapticPrimitive {
    /// Piecewise primitives go down the PWLE path.
    pub fn is_pwle(&self) -> bool {
        matches!(self, HapticPrimitive::Active { .. } | HapticPrimitive::Braking { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bandwidth_map_spans_30_to_300_hz() {
        assert_eq!(PWLE_BW_MAP_SIZE, 271);
    }

    #[test]
    fn primitive_indices_match_the_preloaded_bank() {
        assert_eq!(CompositePrimitive::Noop.effect_index(), None);
        assert_eq!(CompositePrimitive::Click.effect_index(), Some(2));
        assert_eq!(CompositePrimitive::LowTick.effect_index(), Some(10));
        assert_eq!(WAVEFORM_SHORT_VIBRATION_EFFECT_INDEX, 32771);
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Waveform composition.
//!
//! Two serialization targets share the validation front-end: the effect
//! queue (`"<index>.<volume>,<pause>,...,0"`) for preloaded primitives, and
//! the PWLE string for piecewise amplitude/frequency envelopes. Amplitude is
//! clipped against the bandwidth map before the hard device ceiling; a
//! zero-duration seed segment makes envelope continuity explicit whenever a
//! segment does not start where the previous one ended.

use std::fmt::Write as _;

use tracing::debug;

use crate::bandwidth::BandwidthAmplitudeMap;
use crate::error::{HapticsError, HapticsResult};
use crate::primitives::*;

/// Voltage and duration tables the composer scales against.
#[derive(Debug, Clone, Default)]
pub struct EffectTables {
    /// Per-waveform durations in milliseconds, indexed by effect index.
    pub effect_durations_ms: Vec<u32>,
    /// Extra settle time per waveform, from the primitive-delay property.
    pub delay_effect_durations_ms: Vec<u32>,
    pub tick_vol: [u32; 2],
    pub click_vol: [u32; 2],
    pub long_vol: [u32; 2],
}

impl EffectTables {
    /// Volume level for `intensity` in `[0, 1]`, scaled over the voltage
    /// range calibrated for the waveform's family.
    pub fn intensity_to_vol_level(&self, intensity: f32, effect_index: u32) -> u32 {
        let range = match effect_index {
            WAVEFORM_LIGHT_TICK_INDEX => self.tick_vol,
            WAVEFORM_LONG_VIBRATION_EFFECT_INDEX
            | WAVEFORM_SHORT_VIBRATION_EFFECT_INDEX
            | WAVEFORM_QUICK_RISE_INDEX
            | WAVEFORM_QUICK_FALL_INDEX => self.long_vol,
            _ => self.click_vol,
        };
        (intensity * (range[1] - range[0]) as f32).round() as u32 + range[0]
    }

    fn duration_ms(&self, effect_index: u32) -> u32 {
        self.effect_durations_ms
            .get(effect_index as usize)
            .copied()
            .unwrap_or(0)
    }

    fn delay_ms(&self, effect_index: u32) -> u32 {
        self.delay_effect_durations_ms
            .get(effect_index as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// A serialized effect-queue composition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub queue: String,
    pub duration_ms: u32,
}

/// A serialized PWLE composition.
#[derive(Debug, Clone, PartialEq)]
pub struct PwleComposition {
    pub queue: String,
    pub duration_ms: u32,
    /// Segments emitted, continuity seeds included.
    pub segment_count: usize,
    /// Seed segments emitted for continuity.
    pub seed_count: usize,
}

/// Validates and serializes primitive lists into device command strings.
pub struct HapticComposer {
    tables: EffectTables,
    bandwidth_map: Option<BandwidthAmplitudeMap>,
    resonant_frequency_hz: f32,
    pwle_size_max: usize,
}

impl HapticComposer {
    pub fn new(
        tables: EffectTables,
        bandwidth_map: Option<BandwidthAmplitudeMap>,
        resonant_frequency_hz: f32,
        pwle_size_max: usize,
    ) -> Self {
        Self {
            tables,
            bandwidth_map,
            resonant_frequency_hz,
            pwle_size_max,
        }
    }

    pub fn tables(&self) -> &EffectTables {
        &self.tables
    }

    pub fn bandwidth_map(&self) -> Option<&BandwidthAmplitudeMap> {
        self.bandwidth_map.as_ref()
    }

    pub fn pwle_size_max(&self) -> usize {
        self.pwle_size_max
    }

    /// Duration of a single primitive, 0 for the no-op.
    pub fn primitive_duration_ms(&self, primitive: CompositePrimitive) -> u32 {
        match primitive.effect_index() {
            Some(index) => self.tables.duration_ms(index),
            None => 0,
        }
    }

    /// Serialize delay/effect primitives into an effect queue.
    pub fn compose_effects(&self, primitives: &[HapticPrimitive]) -> HapticsResult<Composition> {
        if primitives.is_empty() || primitives.len() > COMPOSE_SIZE_MAX {
            return Err(HapticsError::InvalidArgument(format!(
                "composition size {} out of (0, {COMPOSE_SIZE_MAX}]",
                primitives.len()
            )));
        }

        let mut queue = String::new();
        let mut duration_ms: u32 = 0;
        let mut has_effect = false;

        for primitive in primitives {
            match *primitive {
                HapticPrimitive::Delay { duration_ms: delay } => {
                    if delay > COMPOSE_DELAY_MAX_MS {
                        return Err(HapticsError::InvalidArgument(format!(
                            "delay {delay}ms exceeds {COMPOSE_DELAY_MAX_MS}ms"
                        )));
                    }
                    if delay > 0 {
                        let _ = write!(queue, "{delay},");
                        duration_ms += delay + MAX_PAUSE_TIMING_ERROR_MS;
                    }
                }
                HapticPrimitive::Effect { primitive, scale } => {
                    if !(0.0..=1.0).contains(&scale) {
                        return Err(HapticsError::InvalidArgument(format!(
                            "scale {scale} out of [0, 1]"
                        )));
                    }
                    let Some(index) = primitive.effect_index() else {
                        continue;
                    };
                    has_effect = true;
                    let vol = self.tables.intensity_to_vol_level(scale, index);
                    let _ = write!(queue, "{index}.{vol},");
                    duration_ms += self.tables.duration_ms(index);
                    duration_ms += self.tables.delay_ms(index);
                }
                HapticPrimitive::Active { .. } | HapticPrimitive::Braking { .. } => {
                    return Err(HapticsError::InvalidArgument(
                        "piecewise primitive in effect composition".to_string(),
                    ));
                }
            }
        }

        if !has_effect {
            return Err(HapticsError::InvalidArgument(
                "composition holds no playable primitive".to_string(),
            ));
        }
        queue.push('0');
        debug!(queue = %queue, duration_ms, "composed effect queue");
        Ok(Composition { queue, duration_ms })
    }

    /// Index, duration and volume level of a classic one-shot effect.
    pub fn simple_details(
        &self,
        effect: Effect,
        strength: EffectStrength,
    ) -> HapticsResult<(u32, u32, u32)> {
        let (index, weight) = match effect {
            Effect::TextureTick => (WAVEFORM_LIGHT_TICK_INDEX, 0.5),
            Effect::Tick => (WAVEFORM_CLICK_INDEX, 0.5),
            Effect::Click => (WAVEFORM_CLICK_INDEX, 0.7),
            Effect::HeavyClick => (WAVEFORM_CLICK_INDEX, 1.0),
            Effect::DoubleClick => {
                return Err(HapticsError::UnsupportedOperation(
                    "double click is a compound effect".to_string(),
                ))
            }
        };
        let intensity = strength.intensity() * weight;
        let vol = self.tables.intensity_to_vol_level(intensity, index);
        let time_ms = self.tables.duration_ms(index) + MAX_COLD_START_LATENCY_MS;
        Ok((index, time_ms, vol))
    }

    /// Queue and duration of a compound effect (double click only).
    pub fn compound_details(
        &self,
        effect: Effect,
        strength: EffectStrength,
    ) -> HapticsResult<(u32, String)> {
        if effect != Effect::DoubleClick {
            return Err(HapticsError::UnsupportedOperation(format!(
                "{effect:?} is not a compound effect"
            )));
        }
        let mut queue = String::new();
        let mut time_ms = 0;

        let (index, click_ms, vol) = self.simple_details(Effect::Click, strength)?;
        let _ = write!(queue, "{index}.{vol}");
        time_ms += click_ms;

        let _ = write!(queue, ",{WAVEFORM_DOUBLE_CLICK_SILENCE_MS},");
        time_ms += WAVEFORM_DOUBLE_CLICK_SILENCE_MS + MAX_PAUSE_TIMING_ERROR_MS;

        let (index, heavy_ms, vol) = self.simple_details(Effect::HeavyClick, strength)?;
        let _ = write!(queue, "{index}.{vol}");
        time_ms += heavy_ms;

        Ok((time_ms, queue))
    }

    /// Serialize piecewise primitives into a PWLE string.
    pub fn compose_pwle(&self, primitives: &[HapticPrimitive]) -> HapticsResult<PwleComposition> {
        let Some(bandwidth_map) = &self.bandwidth_map else {
            return Err(HapticsError::UnsupportedOperation(
                "chirp disabled by calibration".to_string(),
            ));
        };
        if primitives.is_empty() || primitives.len() > self.pwle_size_max {
            return Err(HapticsError::InvalidArgument(format!(
                "pwle composition size {} out of (0, {}]",
                primitives.len(),
                self.pwle_size_max
            )));
        }

        let mut queue = String::from("S:0,WF:4,RP:0,WT:0");
        let mut segment_idx = 0usize;
        let mut seed_count = 0usize;
        let mut duration_ms: u32 = 0;
        let mut prev_end_amplitude = 0.0f32;
        let mut prev_end_frequency = self.resonant_frequency_hz;

        for primitive in primitives {
            match *primitive {
                HapticPrimitive::Active {
                    duration_ms: segment_ms,
                    start_amplitude,
                    end_amplitude,
                    start_frequency_hz,
                    end_frequency_hz,
                } => {
                    if !(0..=COMPOSE_PWLE_PRIMITIVE_DURATION_MAX_MS).contains(&segment_ms) {
                        return Err(HapticsError::InvalidArgument(format!(
                            "segment duration {segment_ms}ms out of [0, {COMPOSE_PWLE_PRIMITIVE_DURATION_MAX_MS}]"
                        )));
                    }
                    for amplitude in [start_amplitude, end_amplitude] {
                        if !(PWLE_LEVEL_MIN..=PWLE_LEVEL_MAX).contains(&amplitude) {
                            return Err(HapticsError::InvalidArgument(format!(
                                "amplitude {amplitude} out of [{PWLE_LEVEL_MIN}, {PWLE_LEVEL_MAX}]"
                            )));
                        }
                    }
                    for frequency in [start_frequency_hz, end_frequency_hz] {
                        if !(PWLE_FREQUENCY_MIN_HZ..=PWLE_FREQUENCY_MAX_HZ).contains(&frequency) {
                            return Err(HapticsError::InvalidArgument(format!(
                                "frequency {frequency}Hz out of [{PWLE_FREQUENCY_MIN_HZ}, {PWLE_FREQUENCY_MAX_HZ}]"
                            )));
                        }
                    }

                    let start_amplitude = clip(bandwidth_map, start_amplitude, start_frequency_hz);
                    let end_amplitude = clip(bandwidth_map, end_amplitude, end_frequency_hz);

                    if start_amplitude != prev_end_amplitude
                        || start_frequency_hz != prev_end_frequency
                    {
                        push_active_segment(
                            &mut queue,
                            segment_idx,
                            0,
                            start_amplitude,
                            start_frequency_hz,
                        );
                        segment_idx += 1;
                        seed_count += 1;
                    }

                    push_active_segment(
                        &mut queue,
                        segment_idx,
                        segment_ms,
                        end_amplitude,
                        end_frequency_hz,
                    );
                    segment_idx += 1;

                    prev_end_amplitude = end_amplitude;
                    prev_end_frequency = end_frequency_hz;
                    duration_ms += segment_ms as u32;
                }
                HapticPrimitive::Braking {
                    duration_ms: segment_ms,
                    braking,
                } => {
                    if !(0..=COMPOSE_PWLE_PRIMITIVE_DURATION_MAX_MS).contains(&segment_ms) {
                        return Err(HapticsError::InvalidArgument(format!(
                            "braking duration {segment_ms}ms out of [0, {COMPOSE_PWLE_PRIMITIVE_DURATION_MAX_MS}]"
                        )));
                    }
                    push_braking_segment(
                        &mut queue,
                        segment_idx,
                        segment_ms,
                        braking,
                        prev_end_frequency,
                    );
                    segment_idx += 1;

                    prev_end_amplitude = 0.0;
                    duration_ms += segment_ms as u32;
                }
                HapticPrimitive::Delay { .. } | HapticPrimitive::Effect { .. } => {
                    return Err(HapticsError::InvalidArgument(
                        "queue primitive in piecewise composition".to_string(),
                    ));
                }
            }
        }

        if queue.len() > PWLE_LENGTH_MAX {
            return Err(HapticsError::IllegalState(format!(
                "pwle string too large ({})",
                queue.len()
            )));
        }
        debug!(queue = %queue, duration_ms, "composed pwle queue");
        Ok(PwleComposition {
            queue,
            duration_ms,
            segment_count: segment_idx,
            seed_count,
        })
    }
}

fn clip(map: &BandwidthAmplitudeMap, amplitude: f32, frequency_hz: f32) -> f32 {
    let clipped = match map.level_at(frequency_hz) {
        Some(limit) => amplitude.min(limit),
        None => amplitude,
    };
    clipped.min(PWLE_LEVEL_LIMIT)
}

/// Two-decimal level rendering without trailing zeros (`0.4`, `0.99`, `0`).
fn format_level(level: f32) -> String {
    let rounded = (level * 100.0).round() / 100.0;
    format!("{rounded}")
}

fn push_active_segment(
    queue: &mut String,
    segment_idx: usize,
    duration_ms: i32,
    amplitude: f32,
    frequency_hz: f32,
) {
    let _ = write!(
        queue,
        ",T{segment_idx}:{duration_ms},L{segment_idx}:{},F{segment_idx}:{},C{segment_idx}:1,B{segment_idx}:0,AR{segment_idx}:0,V{segment_idx}:0",
        format_level(amplitude),
        frequency_hz.round() as i64,
    );
}

fn push_braking_segment(
    queue: &mut String,
    segment_idx: usize,
    duration_ms: i32,
    braking: Braking,
    frequency_hz: f32,
) {
    let _ = write!(
        queue,
        ",T{segment_idx}:{duration_ms},L{segment_idx}:0,F{segment_idx}:{},C{segment_idx}:0,B{segment_idx}:{},AR{segment_idx}:0,V{segment_idx}:0",
        frequency_hz.round() as i64,
        braking.code(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> EffectTables {
        EffectTables {
            // Index 2 (click) is 8ms, index 9 (light tick) is 3ms.
            effect_durations_ms: vec![1000, 10, 8, 10, 10, 20, 10, 30, 10, 3, 10],
            delay_effect_durations_ms: vec![0; 11],
            tick_vol: [10, 70],
            click_vol: [10, 70],
            long_vol: [10, 70],
        }
    }

    fn flat_map(level: f32) -> BandwidthAmplitudeMap {
        BandwidthAmplitudeMap::from_levels(vec![level; PWLE_BW_MAP_SIZE]).unwrap()
    }

    fn composer_with_map(map: BandwidthAmplitudeMap) -> HapticComposer {
        HapticComposer::new(tables(), Some(map), 145.0, COMPOSE_PWLE_SIZE_LIMIT as usize)
    }

    fn composer() -> HapticComposer {
        composer_with_map(flat_map(1.0))
    }

    #[test]
    fn click_pause_heavy_click_serializes_with_pause_budget() {
        let c = composer();
        let composition = c
            .compose_effects(&[
                HapticPrimitive::Effect { primitive: CompositePrimitive::Click, scale: 0.7 },
                HapticPrimitive::Delay { duration_ms: 100 },
                HapticPrimitive::Effect { primitive: CompositePrimitive::Click, scale: 1.0 },
            ])
            .unwrap();

        // 0.7 * (70 - 10) = 42 -> vol 52; full scale -> vol 70.
        assert_eq!(composition.queue, "2.52,100,2.70,0");
        // click + (100 + 1ms pause budget) + click
        assert_eq!(composition.duration_ms, 8 + 100 + 1 + 8);
    }

    #[test]
    fn noop_contributes_nothing() {
        let c = composer();
        let composition = c
            .compose_effects(&[
                HapticPrimitive::Effect { primitive: CompositePrimitive::Noop, scale: 0.0 },
                HapticPrimitive::Effect { primitive: CompositePrimitive::LightTick, scale: 0.5 },
            ])
            .unwrap();
        assert_eq!(composition.queue, "9.40,0");
        assert_eq!(composition.duration_ms, 3);
    }

    #[test]
    fn delay_only_composition_is_rejected() {
        let c = composer();
        let err = c
            .compose_effects(&[HapticPrimitive::Delay { duration_ms: 10 }])
            .unwrap_err();
        assert!(matches!(err, HapticsError::InvalidArgument(_)));
    }

    #[test]
    fn out_of_range_inputs_are_rejected() {
        let c = composer();
        assert!(matches!(
            c.compose_effects(&[HapticPrimitive::Effect {
                primitive: CompositePrimitive::Click,
                scale: 1.5
            }]),
            Err(HapticsError::InvalidArgument(_))
        ));
        assert!(matches!(
            c.compose_effects(&[HapticPrimitive::Delay { duration_ms: 10_001 }]),
            Err(HapticsError::InvalidArgument(_))
        ));
        assert!(matches!(c.compose_effects(&[]), Err(HapticsError::InvalidArgument(_))));
    }

    #[test]
    fn strength_and_weight_shape_classic_effects() {
        let c = composer();
        // Click at medium: 0.7 * 0.7 = 0.49 -> round(0.49 * 60) + 10 = 39.
        let (index, time_ms, vol) = c.simple_details(Effect::Click, EffectStrength::Medium).unwrap();
        assert_eq!(index, WAVEFORM_CLICK_INDEX);
        assert_eq!(time_ms, 8 + MAX_COLD_START_LATENCY_MS);
        assert_eq!(vol, 39);

        // Texture tick plays the light-tick waveform at half weight.
        let (index, _, _) = c.simple_details(Effect::TextureTick, EffectStrength::Strong).unwrap();
        assert_eq!(index, WAVEFORM_LIGHT_TICK_INDEX);
    }

    #[test]
    fn double_click_expands_to_click_pause_heavy_click() {
        let c = composer();
        let (time_ms, queue) = c
            .compound_details(Effect::DoubleClick, EffectStrength::Strong)
            .unwrap();
        // click(8+6) + 100 + 1 + heavy(8+6)
        assert_eq!(time_ms, 14 + 100 + 1 + 14);
        // Strong click: 0.7 -> vol 52; strong heavy: 1.0 -> vol 70.
        assert_eq!(queue, "2.52,100,2.70");
    }

    #[test]
    fn pwle_single_segment_gets_a_continuity_seed() {
        let c = composer();
        let composition = c
            .compose_pwle(&[HapticPrimitive::Active {
                duration_ms: 10,
                start_amplitude: 0.5,
                end_amplitude: 0.5,
                start_frequency_hz: 100.0,
                end_frequency_hz: 120.0,
            }])
            .unwrap();

        // Start point differs from (0.0, resonant), so a seed precedes it.
        assert_eq!(composition.segment_count, 2);
        assert_eq!(composition.seed_count, 1);
        assert_eq!(composition.segment_count, 1 + composition.seed_count);
        assert_eq!(composition.duration_ms, 10);
        assert_eq!(
            composition.queue,
            "S:0,WF:4,RP:0,WT:0,T0:0,L0:0.5,F0:100,C0:1,B0:0,AR0:0,V0:0,T1:10,L1:0.5,F1:120,C1:1,B1:0,AR1:0,V1:0"
        );
    }

    #[test]
    fn pwle_continuous_segments_skip_the_seed() {
        let c = composer();
        let composition = c
            .compose_pwle(&[
                HapticPrimitive::Active {
                    duration_ms: 10,
                    start_amplitude: 0.5,
                    end_amplitude: 0.6,
                    start_frequency_hz: 100.0,
                    end_frequency_hz: 120.0,
                },
                HapticPrimitive::Active {
                    duration_ms: 20,
                    start_amplitude: 0.6,
                    end_amplitude: 0.2,
                    start_frequency_hz: 120.0,
                    end_frequency_hz: 140.0,
                },
            ])
            .unwrap();

        // Seed, first segment, then the second chains without a new seed.
        assert_eq!(composition.segment_count, 3);
        assert_eq!(composition.seed_count, 1);
        assert_eq!(composition.duration_ms, 30);
    }

    #[test]
    fn pwle_amplitude_clips_to_the_bandwidth_map() {
        let mut levels = vec![1.0f32; PWLE_BW_MAP_SIZE];
        levels[150 - 30] = 0.4;
        let c = composer_with_map(BandwidthAmplitudeMap::from_levels(levels).unwrap());

        let composition = c
            .compose_pwle(&[HapticPrimitive::Active {
                duration_ms: 10,
                start_amplitude: 0.9,
                end_amplitude: 0.9,
                start_frequency_hz: 150.0,
                end_frequency_hz: 150.0,
            }])
            .unwrap();
        assert!(composition.queue.contains("L0:0.4"), "queue: {}", composition.queue);
        assert!(composition.queue.contains("L1:0.4"), "queue: {}", composition.queue);
    }

    #[test]
    fn pwle_full_scale_clips_to_device_ceiling() {
        let c = composer();
        let composition = c
            .compose_pwle(&[HapticPrimitive::Active {
                duration_ms: 10,
                start_amplitude: 1.0,
                end_amplitude: 1.0,
                start_frequency_hz: 145.0,
                end_frequency_hz: 145.0,
            }])
            .unwrap();
        assert!(composition.queue.contains("L0:0.99"), "queue: {}", composition.queue);
    }

    #[test]
    fn pwle_rejects_out_of_band_frequency() {
        let c = composer();
        let err = c
            .compose_pwle(&[HapticPrimitive::Active {
                duration_ms: 10,
                start_amplitude: 0.5,
                end_amplitude: 0.5,
                start_frequency_hz: 20.0,
                end_frequency_hz: 200.0,
            }])
            .unwrap_err();
        assert!(matches!(err, HapticsError::InvalidArgument(_)));
    }

    #[test]
    fn pwle_braking_rides_the_previous_frequency() {
        let c = composer();
        let composition = c
            .compose_pwle(&[
                HapticPrimitive::Active {
                    duration_ms: 10,
                    start_amplitude: 0.5,
                    end_amplitude: 0.5,
                    start_frequency_hz: 100.0,
                    end_frequency_hz: 120.0,
                },
                HapticPrimitive::Braking { duration_ms: 40, braking: Braking::Clab },
            ])
            .unwrap();

        assert!(
            composition.queue.contains("T2:40,L2:0,F2:120,C2:0,B2:1,AR2:0,V2:0"),
            "queue: {}",
            composition.queue
        );
        assert_eq!(composition.duration_ms, 50);
    }

    #[test]
    fn pwle_without_chirp_is_unsupported() {
        let c = HapticComposer::new(tables(), None, 145.0, COMPOSE_PWLE_SIZE_LIMIT as usize);
        let err = c
            .compose_pwle(&[HapticPrimitive::Braking { duration_ms: 10, braking: Braking::None }])
            .unwrap_err();
        assert!(matches!(err, HapticsError::UnsupportedOperation(_)));
    }

    #[test]
    fn oversized_pwle_string_is_an_illegal_state() {
        // 82 discontinuous segments overflow the 4094-character budget.
        let c = composer();
        let primitives: Vec<_> = (0..82)
            .map(|i| HapticPrimitive::Active {
                duration_ms: 999,
                start_amplitude: 0.91,
                end_amplitude: 0.13,
                start_frequency_hz: 237.0,
                end_frequency_hz: 141.0 + (i % 7) as f32,
            })
            .collect();
        let err = c.compose_pwle(&primitives).unwrap_err();
        assert!(matches!(err, HapticsError::IllegalState(_)), "got {err:?}");
    }

    #[test]
    fn level_format_matches_the_device_grammar() {
        assert_eq!(format_level(0.4), "0.4");
        assert_eq!(format_level(0.99), "0.99");
        assert_eq!(format_level(0.0), "0");
        assert_eq!(format_level(1.0), "1");
        assert_eq!(format_level(0.456), "0.46");
    }
}

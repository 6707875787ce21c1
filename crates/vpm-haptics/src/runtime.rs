// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Actuator runtime: activation lifecycle, amplitude scaling, external
//! control and asynchronous completion.
//!
//! At most one completion watcher is outstanding. A new activation while the
//! watcher has not reported idle fails with `Busy`; external control and
//! direct effect playback are mutually exclusive.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use vpm_core::properties;

use crate::bandwidth::{interpolate_limit_curve, BandwidthAmplitudeMap};
use crate::calibration::{f0_to_hz, HwCal};
use crate::composer::{EffectTables, HapticComposer};
use crate::error::{HapticsError, HapticsResult};
use crate::hw::{HwApi, PcmAmp};
use crate::primitives::*;

/// Grace period granted to a previous watcher before `Busy` is returned.
const ASYNC_COMPLETION_TIMEOUT: Duration = Duration::from_millis(100);
/// Margin added to the expected duration when polling for idle.
const POLLING_TIMEOUT_MS: u32 = 20;

const PRIMITIVE_DELAYS_PROPERTY: &str = "ro.vendor.vibrator.hal.primitive_delays.enabled";
/// Measured settle time per waveform when primitive delays are enabled.
const PRIMITIVE_DELAYS_MS: [u32; 8] = [25, 45, 45, 20, 20, 20, 20, 20];

const WATCHER_THREAD_NAME: &str = "vpm-haptic-watcher";

/// Capability bits reported by [`HapticRuntime::capabilities`].
pub mod capabilities {
    pub const ON_CALLBACK: u32 = 1 << 0;
    pub const PERFORM_CALLBACK: u32 = 1 << 1;
    pub const AMPLITUDE_CONTROL: u32 = 1 << 2;
    pub const EXTERNAL_CONTROL: u32 = 1 << 3;
    pub const COMPOSE_EFFECTS: u32 = 1 << 5;
    pub const ALWAYS_ON_CONTROL: u32 = 1 << 6;
    pub const GET_RESONANT_FREQUENCY: u32 = 1 << 7;
    pub const GET_Q_FACTOR: u32 = 1 << 8;
    pub const FREQUENCY_CONTROL: u32 = 1 << 9;
    pub const COMPOSE_PWLE_EFFECTS: u32 = 1 << 10;
}

/// GPIO-triggered always-on slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlwaysOnId {
    GpioRise,
    GpioFall,
}

/// Invoked once the actuator settles back to idle (or the poll times out).
pub type CompletionCallback = Box<dyn FnOnce(HapticsResult<()>) + Send>;

struct Completion {
    done: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Completion {
    fn is_ready(&self, timeout: Duration) -> bool {
        let (lock, cv) = &*self.done;
        let mut done = lock.lock();
        if !*done && !timeout.is_zero() {
            cv.wait_for(&mut done, timeout);
        }
        *done
    }

    fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct RuntimeState {
    external: bool,
    active_id: Option<u32>,
    global_amplitude: f32,
    completion: Option<Completion>,
}

/// Binds the composer to the actuator nodes.
pub struct HapticRuntime {
    hw: Arc<dyn HwApi>,
    cal: Box<dyn HwCal>,
    composer: HapticComposer,
    resonant_frequency_hz: f32,
    f0_offset: u32,
    chirp_enabled: bool,
    alsa_device: Option<(i32, i32)>,
    pcm: Arc<dyn PcmAmp>,
    state: Mutex<RuntimeState>,
}

impl HapticRuntime {
    /// Bring the actuator up: push calibration into the device, derive the
    /// voltage and duration tables, probe optional endpoints and build the
    /// bandwidth map. Failures fall back to defaults and are logged, as a
    /// boot must proceed with whatever the hardware offers.
    pub fn new(
        hw: Arc<dyn HwApi>,
        cal: Box<dyn HwCal>,
        pcm: Arc<dyn PcmAmp>,
        alsa_device: Option<(i32, i32)>,
    ) -> Self {
        if let Err(e) = hw.set_state(true) {
            error!(error = %e, "failed to set state");
        }

        let resonant_frequency_hz = match cal.f0() {
            Some(f0) => {
                if let Err(e) = hw.set_f0(f0) {
                    error!(error = %e, "failed to store f0");
                }
                f0_to_hz(f0)
            }
            None => {
                error!(
                    "failed to get resonant frequency, using default {}Hz",
                    RESONANT_FREQUENCY_DEFAULT
                );
                RESONANT_FREQUENCY_DEFAULT
            }
        };
        if let Some(redc) = cal.redc() {
            if let Err(e) = hw.set_redc(redc) {
                error!(error = %e, "failed to store redc");
            }
        }
        if let Err(e) = hw.set_q(cal.q()) {
            error!(error = %e, "failed to store q");
        }

        let f0_offset = f0_offset_from_shift(cal.long_frequency_shift());

        let (tick_vol, click_vol, long_vol) = if cal.version() == 1 {
            let levels = cal.vol_levels();
            // Two intensities of a linear volume curve; solve for f(0) with
            // a floor at the minimum usable level.
            let low = levels[0] as f32 - (levels[4] as f32 - levels[0] as f32) / 4.0;
            let click = [(low.round().max(4.0)) as u32, levels[4]];
            (click, click, [0, levels[5]])
        } else {
            (cal.tick_vol_levels(), cal.click_vol_levels(), cal.long_vol_levels())
        };

        let effect_count = match hw.effect_count() {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "failed to read effect count");
                0
            }
        };
        let mut effect_durations_ms = vec![0u32; effect_count as usize];
        for (index, slot) in effect_durations_ms.iter_mut().enumerate() {
            if hw.set_effect_index(index as u32).is_ok() {
                if let Ok(ticks) = hw.effect_duration() {
                    *slot = (ticks as f32 / EFFECT_FREQUENCY_KHZ).ceil() as u32;
                }
            }
        }
        let delay_effect_durations_ms = if properties::get_bool(PRIMITIVE_DELAYS_PROPERTY, false) {
            let mut delays = vec![0u32; effect_count as usize];
            for (slot, delay) in delays.iter_mut().zip(PRIMITIVE_DELAYS_MS) {
                *slot = delay;
            }
            delays
        } else {
            vec![0u32; effect_count as usize]
        };

        if let Err(e) = hw.set_clab_enable(true) {
            error!(error = %e, "failed to enable clab braking");
        }

        let chirp_enabled = cal.is_chirp_enabled();
        let pwle_size_max = if hw.has_pwle() {
            match hw.available_pwle_segments() {
                Ok(segments) => segments.min(COMPOSE_PWLE_SIZE_LIMIT) as usize,
                Err(e) => {
                    error!(error = %e, "failed to get available pwle segments, using default");
                    COMPOSE_PWLE_SIZE_LIMIT as usize
                }
            }
        } else {
            COMPOSE_PWLE_SIZE_LIMIT as usize
        };

        let limit_curve =
            interpolate_limit_curve(&cal.pwle_limit_points(), cal.pwle_limit_default_level());
        let bandwidth_map = if chirp_enabled {
            BandwidthAmplitudeMap::generate(
                cal.as_ref(),
                resonant_frequency_hz,
                long_vol[1],
                &limit_curve,
            )
        } else {
            None
        };

        write_pwle_ramp_down(hw.as_ref());

        let tables = EffectTables {
            effect_durations_ms,
            delay_effect_durations_ms,
            tick_vol,
            click_vol,
            long_vol,
        };
        let composer = HapticComposer::new(tables, bandwidth_map, resonant_frequency_hz, pwle_size_max);

        info!(
            resonant_frequency_hz,
            f0_offset, chirp_enabled, pwle_size_max, "haptic runtime up"
        );
        Self {
            hw,
            cal,
            composer,
            resonant_frequency_hz,
            f0_offset,
            chirp_enabled,
            alsa_device,
            pcm,
            state: Mutex::new(RuntimeState {
                external: false,
                active_id: None,
                global_amplitude: 1.0,
                completion: None,
            }),
        }
    }

    pub fn capabilities(&self) -> u32 {
        let mut caps = capabilities::ON_CALLBACK
            | capabilities::PERFORM_CALLBACK
            | capabilities::COMPOSE_EFFECTS
            | capabilities::ALWAYS_ON_CONTROL
            | capabilities::GET_RESONANT_FREQUENCY
            | capabilities::GET_Q_FACTOR;
        if self.hw.has_effect_scale() {
            caps |= capabilities::AMPLITUDE_CONTROL;
        }
        if self.hw.has_asp_enable() || self.alsa_device.is_some() {
            caps |= capabilities::EXTERNAL_CONTROL;
        }
        if self.hw.has_pwle() && self.chirp_enabled {
            caps |= capabilities::FREQUENCY_CONTROL | capabilities::COMPOSE_PWLE_EFFECTS;
        }
        caps
    }

    /// Play the plain long/short vibration for `timeout_ms`.
    pub fn on(&self, timeout_ms: u32, callback: Option<CompletionCallback>) -> HapticsResult<()> {
        let mut state = self.state.lock();
        self.reject_external(&state)?;
        self.ensure_idle(&mut state)?;

        let index = if timeout_ms < WAVEFORM_LONG_VIBRATION_THRESHOLD_MS {
            WAVEFORM_SHORT_VIBRATION_EFFECT_INDEX
        } else {
            WAVEFORM_LONG_VIBRATION_EFFECT_INDEX
        };
        let timeout_ms = timeout_ms.saturating_add(MAX_COLD_START_LATENCY_MS);
        if let Err(e) = self.hw.set_f0_offset(self.f0_offset) {
            error!(error = %e, "failed to set f0 offset");
        }
        self.activate_locked(&mut state, index, timeout_ms, timeout_ms, callback)
    }

    /// Play a classic effect; returns its expected duration.
    pub fn perform(
        &self,
        effect: Effect,
        strength: EffectStrength,
        callback: Option<CompletionCallback>,
    ) -> HapticsResult<u32> {
        let mut state = self.state.lock();
        self.reject_external(&state)?;
        self.ensure_idle(&mut state)?;

        match effect {
            Effect::DoubleClick => {
                let (time_ms, queue) = self.composer.compound_details(effect, strength)?;
                self.write_effect_queue(&queue)?;
                self.set_effect_amplitude(VOLTAGE_SCALE_MAX as f32, VOLTAGE_SCALE_MAX as f32);
                self.activate_locked(
                    &mut state,
                    WAVEFORM_TRIGGER_QUEUE_INDEX,
                    MAX_TIME_MS,
                    time_ms,
                    callback,
                )?;
                Ok(time_ms)
            }
            _ => {
                let (index, time_ms, vol) = self.composer.simple_details(effect, strength)?;
                self.set_effect_amplitude(vol as f32, VOLTAGE_SCALE_MAX as f32);
                self.activate_locked(&mut state, index, MAX_TIME_MS, time_ms, callback)?;
                Ok(time_ms)
            }
        }
    }

    /// Compose primitives and play them. Delay/effect primitives go through
    /// the effect queue; piecewise primitives go through the PWLE engine.
    pub fn compose(
        &self,
        primitives: &[HapticPrimitive],
        callback: Option<CompletionCallback>,
    ) -> HapticsResult<u32> {
        if primitives.iter().any(HapticPrimitive::is_pwle) {
            return self.compose_pwle(primitives, callback);
        }
        let composition = self.composer.compose_effects(primitives)?;

        let mut state = self.state.lock();
        self.reject_external(&state)?;
        self.ensure_idle(&mut state)?;
        self.write_effect_queue(&composition.queue)?;
        self.set_effect_amplitude(VOLTAGE_SCALE_MAX as f32, VOLTAGE_SCALE_MAX as f32);
        self.activate_locked(
            &mut state,
            WAVEFORM_TRIGGER_QUEUE_INDEX,
            MAX_TIME_MS,
            composition.duration_ms,
            callback,
        )?;
        Ok(composition.duration_ms)
    }

    fn compose_pwle(
        &self,
        primitives: &[HapticPrimitive],
        callback: Option<CompletionCallback>,
    ) -> HapticsResult<u32> {
        if !self.hw.has_pwle() || !self.chirp_enabled {
            return Err(HapticsError::UnsupportedOperation(
                "piecewise composition unavailable".to_string(),
            ));
        }
        let composition = self.composer.compose_pwle(primitives)?;

        let mut state = self.state.lock();
        self.reject_external(&state)?;
        self.ensure_idle(&mut state)?;
        if let Err(e) = self.hw.set_pwle(&composition.queue) {
            error!(error = %e, "failed to write pwle queue");
            return Err(HapticsError::IllegalState("pwle write failed".to_string()));
        }
        self.set_effect_amplitude(VOLTAGE_SCALE_MAX as f32, VOLTAGE_SCALE_MAX as f32);

        let total_ms = composition.duration_ms + MAX_COLD_START_LATENCY_MS;
        self.activate_locked(
            &mut state,
            WAVEFORM_UNSAVED_TRIGGER_QUEUE_INDEX,
            total_ms,
            total_ms,
            callback,
        )?;
        Ok(total_ms)
    }

    /// Deactivate and clear the active effect.
    pub fn off(&self) -> HapticsResult<()> {
        let mut state = self.state.lock();
        debug!("off");
        if let Err(e) = self.hw.set_f0_offset(0) {
            error!(error = %e, "failed to clear f0 offset");
        }
        if let Err(e) = self.hw.set_activate(false) {
            error!(error = %e, "failed to turn vibrator off");
            return Err(HapticsError::IllegalState("deactivate failed".to_string()));
        }
        state.active_id = None;
        Ok(())
    }

    /// Scale subsequent effects; rejected while under external control.
    pub fn set_amplitude(&self, amplitude: f32) -> HapticsResult<()> {
        if amplitude <= 0.0 || amplitude > 1.0 {
            return Err(HapticsError::InvalidArgument(format!(
                "amplitude {amplitude} out of (0, 1]"
            )));
        }
        let mut state = self.state.lock();
        if state.external {
            return Err(HapticsError::UnsupportedOperation(
                "amplitude control unavailable under external control".to_string(),
            ));
        }
        state.global_amplitude = amplitude;
        let vol = self
            .composer
            .tables()
            .intensity_to_vol_level(amplitude, WAVEFORM_LONG_VIBRATION_EFFECT_INDEX);
        let scale = amplitude_to_scale(vol as f32, VOLTAGE_SCALE_MAX as f32);
        self.hw
            .set_effect_scale(scale)
            .map_err(|e| HapticsError::IllegalState(format!("failed to set effect scale: {e}")))
    }

    /// Route the actuator to or from the audio path.
    ///
    /// Enabling while already enabled is idempotent success; `Busy` is
    /// returned only while a completion watcher is outstanding.
    pub fn set_external_control(&self, enabled: bool) -> HapticsResult<()> {
        let mut state = self.state.lock();
        if enabled {
            if self.capabilities() & capabilities::EXTERNAL_CONTROL == 0 {
                return Err(HapticsError::UnsupportedOperation(
                    "no external control path on this device".to_string(),
                ));
            }
            self.ensure_idle(&mut state)?;
            if state.external {
                warn!("external control already enabled");
                return Ok(());
            }
            self.set_effect_amplitude(VOLTAGE_SCALE_MAX as f32, VOLTAGE_SCALE_MAX as f32);
            self.toggle_external_path(true)?;
            state.external = true;
        } else {
            if !state.external {
                debug!("external control already disabled");
                return Ok(());
            }
            self.toggle_external_path(false)?;
            state.external = false;
        }
        Ok(())
    }

    pub fn is_under_external_control(&self) -> bool {
        self.state.lock().external
    }

    /// Bind a classic effect to a GPIO edge.
    pub fn always_on_enable(
        &self,
        id: AlwaysOnId,
        effect: Effect,
        strength: EffectStrength,
    ) -> HapticsResult<()> {
        let (index, _, vol) = self.composer.simple_details(effect, strength)?;
        let scale = amplitude_to_scale(vol as f32, VOLTAGE_SCALE_MAX as f32);
        let result = match id {
            AlwaysOnId::GpioRise => self
                .hw
                .set_gpio_rise_index(index)
                .and_then(|_| self.hw.set_gpio_rise_scale(scale)),
            AlwaysOnId::GpioFall => self
                .hw
                .set_gpio_fall_index(index)
                .and_then(|_| self.hw.set_gpio_fall_scale(scale)),
        };
        result.map_err(|e| HapticsError::IllegalState(format!("gpio slot write failed: {e}")))
    }

    pub fn always_on_disable(&self, id: AlwaysOnId) -> HapticsResult<()> {
        let result = match id {
            AlwaysOnId::GpioRise => self.hw.set_gpio_rise_index(0),
            AlwaysOnId::GpioFall => self.hw.set_gpio_fall_index(0),
        };
        result.map_err(|e| HapticsError::IllegalState(format!("gpio slot write failed: {e}")))
    }

    pub fn supported_effects(&self) -> Vec<Effect> {
        vec![
            Effect::TextureTick,
            Effect::Tick,
            Effect::Click,
            Effect::HeavyClick,
            Effect::DoubleClick,
        ]
    }

    pub fn supported_primitives(&self) -> Vec<CompositePrimitive> {
        CompositePrimitive::all().to_vec()
    }

    pub fn supported_braking(&self) -> HapticsResult<Vec<Braking>> {
        self.require_pwle_caps()?;
        Ok(vec![Braking::None, Braking::Clab])
    }

    pub fn primitive_duration_ms(&self, primitive: CompositePrimitive) -> u32 {
        self.composer.primitive_duration_ms(primitive)
    }

    pub fn composition_delay_max_ms(&self) -> u32 {
        COMPOSE_DELAY_MAX_MS
    }

    pub fn composition_size_max(&self) -> usize {
        COMPOSE_SIZE_MAX
    }

    pub fn pwle_composition_size_max(&self) -> HapticsResult<usize> {
        self.require_pwle_caps()?;
        Ok(self.composer.pwle_size_max())
    }

    pub fn pwle_primitive_duration_max_ms(&self) -> HapticsResult<i32> {
        self.require_pwle_caps()?;
        Ok(COMPOSE_PWLE_PRIMITIVE_DURATION_MAX_MS)
    }

    pub fn bandwidth_amplitude_map(&self) -> HapticsResult<Vec<f32>> {
        self.require_frequency_control()?;
        match self.composer.bandwidth_map() {
            Some(map) => Ok(map.levels().to_vec()),
            None => Err(HapticsError::IllegalState(
                "bandwidth amplitude map unavailable".to_string(),
            )),
        }
    }

    pub fn resonant_frequency_hz(&self) -> f32 {
        self.resonant_frequency_hz
    }

    pub fn q_factor(&self) -> HapticsResult<f32> {
        Ok(crate::calibration::q_to_float(self.cal.q()))
    }

    pub fn frequency_minimum_hz(&self) -> HapticsResult<f32> {
        self.require_frequency_control()?;
        Ok(PWLE_FREQUENCY_MIN_HZ)
    }

    pub fn frequency_resolution_hz(&self) -> HapticsResult<f32> {
        self.require_frequency_control()?;
        Ok(PWLE_FREQUENCY_RESOLUTION_HZ)
    }

    pub fn dump(&self, w: &mut dyn std::io::Write) -> std::io::Result<()> {
        let state = self.state.lock();
        writeln!(w, "Haptic runtime:")?;
        writeln!(w, "  F0 Offset: {}", self.f0_offset)?;
        writeln!(w, "  Resonant Frequency: {}Hz", self.resonant_frequency_hz)?;
        writeln!(w, "  External Control: {}", state.external)?;
        writeln!(w, "  Active Id: {:?}", state.active_id)?;
        let tables = self.composer.tables();
        writeln!(w, "  Voltage Levels:")?;
        writeln!(w, "    Tick Effect Min: {} Max: {}", tables.tick_vol[0], tables.tick_vol[1])?;
        writeln!(w, "    Click Effect Min: {} Max: {}", tables.click_vol[0], tables.click_vol[1])?;
        writeln!(w, "    Long Effect Min: {} Max: {}", tables.long_vol[0], tables.long_vol[1])?;
        writeln!(w, "  Effect Durations: {:?}", tables.effect_durations_ms)?;
        drop(state);
        self.hw.debug(w)?;
        self.cal.debug(w)
    }

    fn reject_external(&self, state: &RuntimeState) -> HapticsResult<()> {
        if state.external {
            Err(HapticsError::UnsupportedOperation(
                "device is under external control".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    fn ensure_idle(&self, state: &mut RuntimeState) -> HapticsResult<()> {
        if let Some(completion) = state.completion.take() {
            if !completion.is_ready(ASYNC_COMPLETION_TIMEOUT) {
                let previous = state.active_id;
                state.completion = Some(completion);
                error!(?previous, "previous vibration pending");
                return Err(HapticsError::Busy("previous vibration pending".to_string()));
            }
            completion.join();
        }
        Ok(())
    }

    fn write_effect_queue(&self, queue: &str) -> HapticsResult<()> {
        self.hw.set_effect_queue(queue).map_err(|e| {
            error!(error = %e, queue, "failed to write effect queue");
            HapticsError::IllegalState("effect queue write failed".to_string())
        })
    }

    /// Best-effort scale write used on the playback paths; devices without
    /// the scale endpoint simply play at full level.
    fn set_effect_amplitude(&self, amplitude: f32, maximum: f32) {
        if !self.hw.has_effect_scale() {
            return;
        }
        let scale = amplitude_to_scale(amplitude, maximum);
        if let Err(e) = self.hw.set_effect_scale(scale) {
            error!(error = %e, "failed to set effect amplitude");
        }
    }

    fn activate_locked(
        &self,
        state: &mut RuntimeState,
        effect_index: u32,
        duration_node_ms: u32,
        total_ms: u32,
        callback: Option<CompletionCallback>,
    ) -> HapticsResult<()> {
        self.hw
            .set_effect_index(effect_index)
            .map_err(|e| HapticsError::IllegalState(format!("failed to set effect index: {e}")))?;
        self.hw
            .set_duration(duration_node_ms)
            .map_err(|e| HapticsError::IllegalState(format!("failed to set duration: {e}")))?;
        self.hw
            .set_activate(true)
            .map_err(|e| HapticsError::IllegalState(format!("failed to activate: {e}")))?;
        state.active_id = Some(effect_index);
        let completion = match self.spawn_watcher(total_ms, callback) {
            Ok(completion) => completion,
            Err(e) => {
                // No watcher will ever deactivate; stop the motor now.
                let _ = self.hw.set_activate(false);
                state.active_id = None;
                return Err(e);
            }
        };
        state.completion = Some(completion);
        Ok(())
    }

    fn spawn_watcher(
        &self,
        total_ms: u32,
        callback: Option<CompletionCallback>,
    ) -> HapticsResult<Completion> {
        let done = Arc::new((Mutex::new(false), Condvar::new()));
        let done_for_thread = Arc::clone(&done);
        let hw = Arc::clone(&self.hw);
        let budget =
            Duration::from_millis(u64::from(total_ms) + u64::from(POLLING_TIMEOUT_MS));
        let spawned = thread::Builder::new()
            .name(WATCHER_THREAD_NAME.to_string())
            .spawn(move || {
                let settled = hw.poll_vibe_state(false, budget);
                if !settled {
                    error!(budget_ms = budget.as_millis() as u64, "timeout polling stop state");
                }
                if let Err(e) = hw.set_activate(false) {
                    error!(error = %e, "failed to deactivate after completion");
                }
                {
                    let (lock, cv) = &*done_for_thread;
                    *lock.lock() = true;
                    cv.notify_all();
                }
                if let Some(callback) = callback {
                    let outcome = if settled {
                        Ok(())
                    } else {
                        Err(HapticsError::IllegalState("completion poll timed out".to_string()))
                    };
                    callback(outcome);
                }
            });
        match spawned {
            Ok(handle) => Ok(Completion { done, handle: Some(handle) }),
            Err(e) => {
                error!(error = %e, "failed to spawn completion watcher");
                Err(HapticsError::Internal("completion watcher spawn failed".to_string()))
            }
        }
    }

    fn toggle_external_path(&self, enabled: bool) -> HapticsResult<()> {
        if let Some((card, device)) = self.alsa_device {
            let ok = if enabled { self.pcm.enable(card, device) } else { self.pcm.disable() };
            if !ok {
                error!(enabled, card, device, "failed to toggle haptic pcm device");
                return Err(HapticsError::IllegalState("pcm toggle failed".to_string()));
            }
        }
        if self.hw.has_asp_enable() {
            if let Err(e) = self.hw.set_asp_enable(enabled) {
                error!(error = %e, "failed to set external control");
                return Err(HapticsError::IllegalState("asp toggle failed".to_string()));
            }
        }
        Ok(())
    }

    fn require_pwle_caps(&self) -> HapticsResult<()> {
        if self.capabilities() & capabilities::COMPOSE_PWLE_EFFECTS == 0 {
            return Err(HapticsError::UnsupportedOperation(
                "piecewise composition unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn require_frequency_control(&self) -> HapticsResult<()> {
        if self.capabilities() & capabilities::FREQUENCY_CONTROL == 0 {
            return Err(HapticsError::UnsupportedOperation(
                "frequency control unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Drop for HapticRuntime {
    fn drop(&mut self) {
        let completion = self.state.lock().completion.take();
        if let Some(completion) = completion {
            // Unblock the poll so the watcher can finish.
            let _ = self.hw.set_activate(false);
            completion.join();
        }
    }
}

/// dB attenuation steps below full scale for the digital scale node.
fn amplitude_to_scale(amplitude: f32, maximum: f32) -> u32 {
    ((-20.0 * (amplitude / maximum).log10()) / AMP_ATTENUATE_STEP_SIZE).round() as u32
}

/// Long-effect carrier shift in device fixed point; negative shifts wrap
/// into the 24-bit register range.
fn f0_offset_from_shift(shift: i32) -> u32 {
    match shift {
        0 => 0,
        s if s > 0 => (s as u32) << 14,
        s => (1u32 << 24) - ((s.unsigned_abs()) << 14),
    }
}

fn write_pwle_ramp_down(hw: &dyn HwApi) {
    // pwle_ramp_down takes Crd = 1048.576 / Trd (24-bit); zero turns the
    // feature off.
    let coefficient = if RAMP_DOWN_TIME_MS != 0.0 {
        (RAMP_DOWN_CONSTANT / (RAMP_DOWN_TIME_MS / 1000.0)) as u32
    } else {
        0
    };
    if let Err(e) = hw.set_pwle_ramp_down(coefficient) {
        error!(error = %e, coefficient, "failed to write pwle_ramp_down");
    }
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Runtime scenarios over the in-memory actuator.

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use vpm_core::properties;
use vpm_haptics::calibration::CalTable;
use vpm_haptics::hw::FakeHwApi;
use vpm_haptics::primitives::*;
use vpm_haptics::runtime::capabilities;
use vpm_haptics::{
    AlwaysOnId, Effect, EffectStrength, HapticPrimitive, HapticRuntime, HapticsError, NullPcmAmp,
};

const CHIRP_PROPERTY: &str = "persist.vendor.vibrator.hal.chirp.enabled";

// The property store backing chirp calibration is process-global; tests in
// this binary run in parallel threads, so anything touching it serializes.
static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

fn setup() -> std::sync::MutexGuard<'static, ()> {
    let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    properties::teardown();
    guard
}

fn calibration() -> CalTable {
    CalTable {
        // 145 Hz in Q10.14, plausible coil resistance in Q7.17.
        f0: Some(145 << 14),
        redc: Some(340_787),
        tick_vol_levels: Some([10, 70]),
        click_vol_levels: Some([10, 70]),
        long_vol_levels: Some([10, 70]),
        version: 2,
        ..Default::default()
    }
}

fn runtime_with(hw: FakeHwApi) -> HapticRuntime {
    HapticRuntime::new(Arc::new(hw), Box::new(calibration()), Arc::new(NullPcmAmp), None)
}

fn chirp_on() {
    properties::set(CHIRP_PROPERTY, "true");
}

fn wait_callback(rx: &mpsc::Receiver<Result<(), HapticsError>>) -> Result<(), HapticsError> {
    rx.recv_timeout(Duration::from_secs(2)).expect("completion callback")
}

// Click + pause + heavy click: one queue write before activation, and the
// duration carries the 1ms pause budget.
#[test]
fn compose_click_delay_heavy_click() {
    let _guard = setup();
    let hw = FakeHwApi::new();
    let runtime = runtime_with(hw.clone());

    let (tx, rx) = mpsc::channel();
    let duration = runtime
        .compose(
            &[
                HapticPrimitive::Effect { primitive: CompositePrimitive::Click, scale: 0.7 },
                HapticPrimitive::Delay { duration_ms: 100 },
                HapticPrimitive::Effect { primitive: CompositePrimitive::Click, scale: 1.0 },
            ],
            Some(Box::new(move |outcome| {
                let _ = tx.send(outcome);
            })),
        )
        .unwrap();

    let click_ms = runtime.primitive_duration_ms(CompositePrimitive::Click);
    assert_eq!(duration, click_ms + 100 + 1 + click_ms);

    // Exactly one command-string write, before the activate write.
    let writes = hw.writes();
    let queue_positions: Vec<_> = writes
        .iter()
        .enumerate()
        .filter(|(_, (endpoint, _))| endpoint == "cp_trigger_queue")
        .map(|(i, _)| i)
        .collect();
    assert_eq!(queue_positions.len(), 1);
    let activate_position = writes
        .iter()
        .rposition(|(endpoint, value)| endpoint == "activate" && value == "1")
        .unwrap();
    assert!(queue_positions[0] < activate_position);
    assert_eq!(hw.writes_to("cp_trigger_index").last().map(String::as_str), Some("65534"));

    // Hardware settles; the callback reports success.
    hw.set_vibe_state(false);
    assert!(wait_callback(&rx).is_ok());
    assert!(!hw.is_activated());
}

// PWLE with a start frequency below 30 Hz is rejected synchronously.
#[test]
fn pwle_out_of_range_frequency_fails() {
    let _guard = setup();
    chirp_on();
    let runtime = runtime_with(FakeHwApi::new());

    let err = runtime
        .compose(
            &[HapticPrimitive::Active {
                duration_ms: 10,
                start_amplitude: 0.5,
                end_amplitude: 0.5,
                start_frequency_hz: 20.0,
                end_frequency_hz: 200.0,
            }],
            None,
        )
        .unwrap_err();
    assert!(matches!(err, HapticsError::InvalidArgument(_)));
    properties::teardown();
}

// The composed PWLE string reaches the pwle node with clipped levels.
#[test]
fn pwle_write_carries_clipped_amplitude() {
    let _guard = setup();
    chirp_on();
    let hw = FakeHwApi::new();
    let runtime = runtime_with(hw.clone());

    runtime
        .compose(
            &[HapticPrimitive::Active {
                duration_ms: 10,
                start_amplitude: 1.0,
                end_amplitude: 1.0,
                start_frequency_hz: 145.0,
                end_frequency_hz: 145.0,
            }],
            None,
        )
        .unwrap();

    let pwle_writes = hw.writes_to("pwle");
    assert_eq!(pwle_writes.len(), 1);
    assert!(pwle_writes[0].starts_with("S:0,WF:4,RP:0,WT:0"));
    // Resonance sits at the top of the normalized map, so only the device
    // ceiling applies.
    assert!(pwle_writes[0].contains("L0:0.99"), "pwle: {}", pwle_writes[0]);
    assert_eq!(hw.writes_to("cp_trigger_index").last().map(String::as_str), Some("65529"));

    hw.set_vibe_state(false);
    properties::teardown();
}

// External control is mutually exclusive with direct playback.
#[test]
fn external_control_gates_playback_and_amplitude() {
    let _guard = setup();
    let hw = FakeHwApi::new();
    let runtime = runtime_with(hw.clone());

    assert!(runtime.set_external_control(true).is_ok());
    assert!(runtime.is_under_external_control());
    // Re-enabling while already external is idempotent success.
    assert!(runtime.set_external_control(true).is_ok());

    let err = runtime.on(100, None).unwrap_err();
    assert!(matches!(err, HapticsError::UnsupportedOperation(_) | HapticsError::Busy(_)));
    let err = runtime.set_amplitude(0.5).unwrap_err();
    assert!(matches!(err, HapticsError::UnsupportedOperation(_)));

    assert!(runtime.set_external_control(false).is_ok());
    assert!(!runtime.is_under_external_control());
    assert_eq!(hw.writes_to("asp_enable"), vec!["1", "0"]);

    // Back to idle: playback works again.
    assert!(runtime.on(100, None).is_ok());
    hw.set_vibe_state(false);
}

// A second activation while the watcher is pending fails with Busy.
#[test]
fn overlapping_activation_is_busy() {
    let _guard = setup();
    let hw = FakeHwApi::new();
    let runtime = runtime_with(hw.clone());

    runtime.on(10_000, None).unwrap();
    let err = runtime.on(100, None).unwrap_err();
    assert!(matches!(err, HapticsError::Busy(_)));

    // Once the hardware settles the runtime accepts work again.
    hw.set_vibe_state(false);
    std::thread::sleep(Duration::from_millis(50));
    assert!(runtime.on(100, None).is_ok());
    hw.set_vibe_state(false);
}

// A watcher timeout surfaces to the callback and still deactivates.
#[test]
fn completion_timeout_still_deactivates() {
    let _guard = setup();
    let hw = FakeHwApi::new();
    let runtime = runtime_with(hw.clone());

    let (tx, rx) = mpsc::channel();
    runtime
        .on(
            10,
            Some(Box::new(move |outcome| {
                let _ = tx.send(outcome);
            })),
        )
        .unwrap();

    // Never settle the vibe state; the poll budget is 10 + 6 + 20 ms.
    let outcome = wait_callback(&rx);
    assert!(matches!(outcome, Err(HapticsError::IllegalState(_))));
    assert!(!hw.is_activated());
}

// Short requests play the one-shot waveform, long ones the looped one.
#[test]
fn on_selects_waveform_by_duration_threshold() {
    let _guard = setup();
    let hw = FakeHwApi::new();
    let runtime = runtime_with(hw.clone());
    hw.clear_writes();

    runtime.on(10, None).unwrap();
    hw.set_vibe_state(false);
    std::thread::sleep(Duration::from_millis(50));
    runtime.on(500, None).unwrap();
    hw.set_vibe_state(false);

    assert_eq!(
        hw.writes_to("cp_trigger_index"),
        vec![
            WAVEFORM_SHORT_VIBRATION_EFFECT_INDEX.to_string(),
            WAVEFORM_LONG_VIBRATION_EFFECT_INDEX.to_string()
        ]
    );
    // Cold-start padding lands in the duration node.
    assert_eq!(hw.writes_to("duration"), vec!["16", "506"]);
}

// Capability bits follow the probed endpoints and calibration.
#[test]
fn capabilities_follow_probes() {
    let _guard = setup();
    let runtime = runtime_with(FakeHwApi::new());
    let caps = runtime.capabilities();
    assert_ne!(caps & capabilities::AMPLITUDE_CONTROL, 0);
    assert_ne!(caps & capabilities::EXTERNAL_CONTROL, 0);
    // Chirp disabled by calibration: no frequency control.
    assert_eq!(caps & capabilities::FREQUENCY_CONTROL, 0);
    assert!(runtime.pwle_composition_size_max().is_err());
    assert!(runtime.bandwidth_amplitude_map().is_err());

    chirp_on();
    let runtime = runtime_with(FakeHwApi::new().with_available_pwle_segments(40));
    let caps = runtime.capabilities();
    assert_ne!(caps & capabilities::COMPOSE_PWLE_EFFECTS, 0);
    assert_eq!(runtime.pwle_composition_size_max().unwrap(), 40);
    let map = runtime.bandwidth_amplitude_map().unwrap();
    assert_eq!(map.len(), PWLE_BW_MAP_SIZE);

    let runtime = runtime_with(FakeHwApi::new().without_pwle().without_effect_scale());
    let caps = runtime.capabilities();
    assert_eq!(caps & capabilities::COMPOSE_PWLE_EFFECTS, 0);
    assert_eq!(caps & capabilities::AMPLITUDE_CONTROL, 0);
    properties::teardown();
}

// Double click performs as click + 100ms silence + heavy click.
#[test]
fn perform_double_click() {
    let _guard = setup();
    let hw = FakeHwApi::new();
    let runtime = runtime_with(hw.clone());

    let duration = runtime
        .perform(Effect::DoubleClick, EffectStrength::Strong, None)
        .unwrap();
    let click_ms = runtime.primitive_duration_ms(CompositePrimitive::Click);
    assert_eq!(duration, (click_ms + 6) * 2 + 100 + 1);

    let queues = hw.writes_to("cp_trigger_queue");
    assert_eq!(queues.len(), 1);
    assert!(queues[0].contains(",100,"), "queue: {}", queues[0]);
    hw.set_vibe_state(false);
}

// Always-on slots take the effect index and a dB-step scale.
#[test]
fn always_on_binds_gpio_slots() {
    let _guard = setup();
    let hw = FakeHwApi::new();
    let runtime = runtime_with(hw.clone());

    runtime
        .always_on_enable(AlwaysOnId::GpioRise, Effect::Click, EffectStrength::Medium)
        .unwrap();
    assert_eq!(hw.writes_to("gpio1_rise_index"), vec!["2"]);
    assert_eq!(hw.writes_to("gpio1_rise_dig_scale").len(), 1);

    runtime.always_on_disable(AlwaysOnId::GpioRise).unwrap();
    assert_eq!(hw.writes_to("gpio1_rise_index"), vec!["2", "0"]);
}

// Amplitude must be in (0, 1].
#[test]
fn set_amplitude_validates_range() {
    let _guard = setup();
    let runtime = runtime_with(FakeHwApi::new());
    assert!(matches!(runtime.set_amplitude(0.0), Err(HapticsError::InvalidArgument(_))));
    assert!(matches!(runtime.set_amplitude(1.5), Err(HapticsError::InvalidArgument(_))));
    assert!(runtime.set_amplitude(0.5).is_ok());
}

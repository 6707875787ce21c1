// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # VPM haptic effect engine
//!
//! Composes short waveform primitives into longer, timed vibration patterns
//! and drives the actuator through its sysfs surface. Composition validates
//! and serializes primitives into device command strings; the runtime gates
//! activation against external control and a single outstanding completion
//! watcher.

pub mod bandwidth;
pub mod calibration;
pub mod composer;
pub mod error;
pub mod hw;
pub mod primitives;
pub mod runtime;

pub use bandwidth::BandwidthAmplitudeMap;
pub use calibration::{CalTable, HwCal};
pub use composer::{Composition, EffectTables, HapticComposer, PwleComposition};
pub use error::{HapticsError, HapticsResult};
pub use hw::{FakeHwApi, HwApi, NullPcmAmp, PcmAmp, SysfsHwApi};
pub use primitives::{
    Braking, CompositePrimitive, Effect, EffectStrength, HapticPrimitive,
};
pub use runtime::{capabilities, AlwaysOnId, CompletionCallback, HapticRuntime};

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

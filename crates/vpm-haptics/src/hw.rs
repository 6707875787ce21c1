// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Actuator hardware surface.
//!
//! [`HwApi`] mirrors the driver's sysfs layout one method per endpoint.
//! Optional endpoints (`asp_enable`, `cp_dig_scale`, `pwle`) are probed at
//! open time and reported through the `has_*` methods so capability bits can
//! be derived without touching the device.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// `/proc/asound/pcm` line marker of the haptics PCM device.
pub const HAPTIC_PCM_DEVICE_SYMBOL: &str = "haptic nohost playback";
/// Default location of the sound card inventory.
pub const PROC_SND_PCM: &str = "/proc/asound/pcm";

/// Stride of the vibe-state poll loop.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One method per driver endpoint.
pub trait HwApi: Send + Sync {
    fn set_f0(&self, value: u32) -> io::Result<()>;
    fn set_f0_offset(&self, value: u32) -> io::Result<()>;
    fn set_redc(&self, value: u32) -> io::Result<()>;
    fn set_q(&self, value: u32) -> io::Result<()>;
    fn set_state(&self, value: bool) -> io::Result<()>;
    fn set_activate(&self, value: bool) -> io::Result<()>;
    fn set_duration(&self, value: u32) -> io::Result<()>;
    fn effect_count(&self) -> io::Result<u32>;
    /// Duration, in 48 kHz ticks, of the currently selected effect.
    fn effect_duration(&self) -> io::Result<u32>;
    fn set_effect_index(&self, value: u32) -> io::Result<()>;
    fn set_effect_queue(&self, value: &str) -> io::Result<()>;
    fn has_effect_scale(&self) -> bool;
    fn set_effect_scale(&self, value: u32) -> io::Result<()>;
    fn set_global_scale(&self, value: u32) -> io::Result<()>;
    fn has_asp_enable(&self) -> bool;
    fn set_asp_enable(&self, value: bool) -> io::Result<()>;
    fn set_gpio_fall_index(&self, value: u32) -> io::Result<()>;
    fn set_gpio_fall_scale(&self, value: u32) -> io::Result<()>;
    fn set_gpio_rise_index(&self, value: u32) -> io::Result<()>;
    fn set_gpio_rise_scale(&self, value: u32) -> io::Result<()>;
    /// Block until the vibe state reads `value` or `timeout` elapses.
    fn poll_vibe_state(&self, value: bool, timeout: Duration) -> bool;
    fn set_clab_enable(&self, value: bool) -> io::Result<()>;
    fn available_pwle_segments(&self) -> io::Result<u32>;
    fn has_pwle(&self) -> bool;
    fn set_pwle(&self, value: &str) -> io::Result<()>;
    fn set_pwle_ramp_down(&self, value: u32) -> io::Result<()>;
    fn debug(&self, w: &mut dyn Write) -> io::Result<()>;
}

/// Sysfs-backed implementation rooted at the driver directory.
pub struct SysfsHwApi {
    base: PathBuf,
    record: Mutex<Vec<(String, String)>>,
}

impl SysfsHwApi {
    pub fn open(base: impl AsRef<Path>) -> Self {
        Self {
            base: base.as_ref().to_path_buf(),
            record: Mutex::new(Vec::new()),
        }
    }

    fn endpoint(&self, rel: &str) -> PathBuf {
        self.base.join(rel)
    }

    fn set(&self, rel: &str, value: impl ToString) -> io::Result<()> {
        let value = value.to_string();
        std::fs::write(self.endpoint(rel), &value)?;
        self.record.lock().push((rel.to_string(), value));
        Ok(())
    }

    fn get(&self, rel: &str) -> io::Result<String> {
        std::fs::read_to_string(self.endpoint(rel)).map(|s| s.trim_end().to_string())
    }

    fn get_u32(&self, rel: &str) -> io::Result<u32> {
        self.get(rel)?
            .parse()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    fn has(&self, rel: &str) -> bool {
        self.endpoint(rel).exists()
    }
}

impl HwApi for SysfsHwApi {
    fn set_f0(&self, value: u32) -> io::Result<()> {
        self.set("device/f0_stored", value)
    }

    fn set_f0_offset(&self, value: u32) -> io::Result<()> {
        self.set("device/f0_offset", value)
    }

    fn set_redc(&self, value: u32) -> io::Result<()> {
        self.set("device/redc_stored", value)
    }

    fn set_q(&self, value: u32) -> io::Result<()> {
        self.set("device/q_stored", value)
    }

    fn set_state(&self, value: bool) -> io::Result<()> {
        self.set("state", value as u32)
    }

    fn set_activate(&self, value: bool) -> io::Result<()> {
        self.set("activate", value as u32)
    }

    fn set_duration(&self, value: u32) -> io::Result<()> {
        self.set("duration", value)
    }

    fn effect_count(&self) -> io::Result<u32> {
        self.get_u32("device/num_waves")
    }

    fn effect_duration(&self) -> io::Result<u32> {
        self.get_u32("device/cp_trigger_duration")
    }

    fn set_effect_index(&self, value: u32) -> io::Result<()> {
        self.set("device/cp_trigger_index", value)
    }

    fn set_effect_queue(&self, value: &str) -> io::Result<()> {
        self.set("device/cp_trigger_queue", value)
    }

    fn has_effect_scale(&self) -> bool {
        self.has("device/cp_dig_scale")
    }

    fn set_effect_scale(&self, value: u32) -> io::Result<()> {
        self.set("device/cp_dig_scale", value)
    }

    fn set_global_scale(&self, value: u32) -> io::Result<()> {
        self.set("device/dig_scale", value)
    }

    fn has_asp_enable(&self) -> bool {
        self.has("device/asp_enable")
    }

    fn set_asp_enable(&self, value: bool) -> io::Result<()> {
        self.set("device/asp_enable", value as u32)
    }

    fn set_gpio_fall_index(&self, value: u32) -> io::Result<()> {
        self.set("device/gpio1_fall_index", value)
    }

    fn set_gpio_fall_scale(&self, value: u32) -> io::Result<()> {
        self.set("device/gpio1_fall_dig_scale", value)
    }

    fn set_gpio_rise_index(&self, value: u32) -> io::Result<()> {
        self.set("device/gpio1_rise_index", value)
    }

    fn set_gpio_rise_scale(&self, value: u32) -> io::Result<()> {
        self.set("device/gpio1_rise_dig_scale", value)
    }

    fn poll_vibe_state(&self, value: bool, timeout: Duration) -> bool {
        let want = if value { "1" } else { "0" };
        let deadline = Instant::now() + timeout;
        loop {
            match self.get("device/vibe_state") {
                Ok(state) if state == want => return true,
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "vibe_state read failed");
                    return false;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn set_clab_enable(&self, value: bool) -> io::Result<()> {
        self.set("device/clab_enable", value as u32)
    }

    fn available_pwle_segments(&self) -> io::Result<u32> {
        self.get_u32("device/available_pwle_segments")
    }

    fn has_pwle(&self) -> bool {
        self.has("device/pwle")
    }

    fn set_pwle(&self, value: &str) -> io::Result<()> {
        self.set("device/pwle", value)
    }

    fn set_pwle_ramp_down(&self, value: u32) -> io::Result<()> {
        self.set("device/pwle_ramp_down", value)
    }

    fn debug(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "HwApi ({}):", self.base.display())?;
        for (endpoint, value) in self.record.lock().iter() {
            writeln!(w, "  {endpoint} = {value}")?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct FakeValues {
    writes: Vec<(String, String)>,
    effect_index: u32,
    activate: bool,
}

struct FakeConfig {
    effect_count: u32,
    /// Per-index effect durations, in 48 kHz ticks.
    effect_duration_ticks: Vec<u32>,
    available_pwle_segments: u32,
    has_effect_scale: bool,
    has_asp_enable: bool,
    has_pwle: bool,
}

/// In-memory actuator for tests.
///
/// `set_activate(true)` raises the vibe state like real hardware starting to
/// play; tests complete a vibration with [`FakeHwApi::set_vibe_state`].
#[derive(Clone)]
pub struct FakeHwApi {
    values: Arc<Mutex<FakeValues>>,
    config: Arc<Mutex<FakeConfig>>,
    vibe: Arc<(Mutex<bool>, Condvar)>,
}

impl FakeHwApi {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(FakeValues::default())),
            config: Arc::new(Mutex::new(FakeConfig {
                effect_count: 11,
                effect_duration_ticks: vec![
                    48_000, 480, 384, 480, 480, 960, 480, 1440, 480, 144, 480,
                ],
                available_pwle_segments: 100,
                has_effect_scale: true,
                has_asp_enable: true,
                has_pwle: true,
            })),
            vibe: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn without_pwle(self) -> Self {
        self.config.lock().has_pwle = false;
        self
    }

    pub fn without_effect_scale(self) -> Self {
        self.config.lock().has_effect_scale = false;
        self
    }

    pub fn without_asp_enable(self) -> Self {
        self.config.lock().has_asp_enable = false;
        self
    }

    pub fn with_available_pwle_segments(self, segments: u32) -> Self {
        self.config.lock().available_pwle_segments = segments;
        self
    }

    /// Drive the vibe state from a test (hardware finishing a waveform).
    pub fn set_vibe_state(&self, active: bool) {
        let (lock, cv) = &*self.vibe;
        *lock.lock() = active;
        cv.notify_all();
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.values.lock().writes.clone()
    }

    /// Forget recorded writes (e.g. the construction-time probes).
    pub fn clear_writes(&self) {
        self.values.lock().writes.clear();
    }

    /// Values written to one endpoint, in order.
    pub fn writes_to(&self, endpoint: &str) -> Vec<String> {
        self.values
            .lock()
            .writes
            .iter()
            .filter(|(e, _)| e == endpoint)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn is_activated(&self) -> bool {
        self.values.lock().activate
    }

    fn set(&self, endpoint: &str, value: impl ToString) -> io::Result<()> {
        self.values
            .lock()
            .writes
            .push((endpoint.to_string(), value.to_string()));
        Ok(())
    }
}

impl Default for FakeHwApi {
    fn default() -> Self {
        Self::new()
    }
}

impl HwApi for FakeHwApi {
    fn set_f0(&self, value: u32) -> io::Result<()> {
        self.set("f0_stored", value)
    }

    fn set_f0_offset(&self, value: u32) -> io::Result<()> {
        self.set("f0_offset", value)
    }

    fn set_redc(&self, value: u32) -> io::Result<()> {
        self.set("redc_stored", value)
    }

    fn set_q(&self, value: u32) -> io::Result<()> {
        self.set("q_stored", value)
    }

    fn set_state(&self, value: bool) -> io::Result<()> {
        self.set("state", value as u32)
    }

    fn set_activate(&self, value: bool) -> io::Result<()> {
        self.values.lock().activate = value;
        // Real hardware raises vibe_state while a waveform plays and drops
        // it on deactivation; tests drop it earlier via set_vibe_state.
        self.set_vibe_state(value);
        self.set("activate", value as u32)
    }

    fn set_duration(&self, value: u32) -> io::Result<()> {
        self.set("duration", value)
    }

    fn effect_count(&self) -> io::Result<u32> {
        Ok(self.config.lock().effect_count)
    }

    fn effect_duration(&self) -> io::Result<u32> {
        let index = self.values.lock().effect_index as usize;
        let config = self.config.lock();
        config
            .effect_duration_ticks
            .get(index)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such effect"))
    }

    fn set_effect_index(&self, value: u32) -> io::Result<()> {
        self.values.lock().effect_index = value;
        self.set("cp_trigger_index", value)
    }

    fn set_effect_queue(&self, value: &str) -> io::Result<()> {
        self.set("cp_trigger_queue", value)
    }

    fn has_effect_scale(&self) -> bool {
        self.config.lock().has_effect_scale
    }

    fn set_effect_scale(&self, value: u32) -> io::Result<()> {
        self.set("cp_dig_scale", value)
    }

    fn set_global_scale(&self, value: u32) -> io::Result<()> {
        self.set("dig_scale", value)
    }

    fn has_asp_enable(&self) -> bool {
        self.config.lock().has_asp_enable
    }

    fn set_asp_enable(&self, value: bool) -> io::Result<()> {
        self.set("asp_enable", value as u32)
    }

    fn set_gpio_fall_index(&self, value: u32) -> io::Result<()> {
        self.set("gpio1_fall_index", value)
    }

    fn set_gpio_fall_scale(&self, value: u32) -> io::Result<()> {
        self.set("gpio1_fall_dig_scale", value)
    }

    fn set_gpio_rise_index(&self, value: u32) -> io::Result<()> {
        self.set("gpio1_rise_index", value)
    }

    fn set_gpio_rise_scale(&self, value: u32) -> io::Result<()> {
        self.set("gpio1_rise_dig_scale", value)
    }

    fn poll_vibe_state(&self, value: bool, timeout: Duration) -> bool {
        let (lock, cv) = &*self.vibe;
        let mut state = lock.lock();
        let deadline = Instant::now() + timeout;
        while *state != value {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            cv.wait_for(&mut state, deadline - now);
        }
        true
    }

    fn set_clab_enable(&self, value: bool) -> io::Result<()> {
        self.set("clab_enable", value as u32)
    }

    fn available_pwle_segments(&self) -> io::Result<u32> {
        Ok(self.config.lock().available_pwle_segments)
    }

    fn has_pwle(&self) -> bool {
        self.config.lock().has_pwle
    }

    fn set_pwle(&self, value: &str) -> io::Result<()> {
        self.set("pwle", value)
    }

    fn set_pwle_ramp_down(&self, value: u32) -> io::Result<()> {
        self.set("pwle_ramp_down", value)
    }

    fn debug(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "FakeHwApi:")?;
        for (endpoint, value) in self.values.lock().writes.iter() {
            writeln!(w, "  {endpoint} = {value}")?;
        }
        Ok(())
    }
}

/// Audio amplifier toggle used while the actuator is under external control.
pub trait PcmAmp: Send + Sync {
    fn enable(&self, card: i32, device: i32) -> bool;
    fn disable(&self) -> bool;
}

/// Stand-in used when no platform audio stack is wired up.
pub struct NullPcmAmp;

impl PcmAmp for NullPcmAmp {
    fn enable(&self, card: i32, device: i32) -> bool {
        debug!(card, device, "pcm amp enable (null)");
        true
    }

    fn disable(&self) -> bool {
        debug!("pcm amp disable (null)");
        true
    }
}

/// Scan a `/proc/asound/pcm` style listing for the haptics PCM device and
/// return its `(card, device)` pair.
pub fn find_haptic_pcm(reader: impl BufRead) -> Option<(i32, i32)> {
    for line in reader.lines() {
        let line = line.ok()?;
        if !line.contains(HAPTIC_PCM_DEVICE_SYMBOL) {
            continue;
        }
        let address = line.split(':').next()?;
        let (card, device) = address.trim().split_once('-')?;
        return Some((card.parse().ok()?, device.parse().ok()?));
    }
    None
}

/// Probe the platform sound card inventory for the haptics PCM device.
pub fn discover_haptic_pcm() -> Option<(i32, i32)> {
    let file = std::fs::File::open(PROC_SND_PCM).ok()?;
    find_haptic_pcm(io::BufReader::new(file))
}

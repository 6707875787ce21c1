// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Boolean feature flags with test overrides.
//!
//! Flags compile to a fixed table; each flag reads as its compiled default
//! until an override is installed. Reads are a single atomic load so they are
//! safe on the dispatcher hot path. `getter_from_string` resolves a flag's
//! getter by name for text-driven wiring (catalog predicates, tests).

use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

const OVERRIDE_NONE: u8 = 0;
const OVERRIDE_TRUE: u8 = 1;
const OVERRIDE_FALSE: u8 = 2;

/// Getter signature handed out by [`FlagProvider::getter_from_string`].
pub type FlagGetter = fn() -> bool;

struct FlagEntry {
    name: &'static str,
    default: bool,
    cell: AtomicU8,
}

macro_rules! define_flags {
    ($(($variant:ident, $getter:ident, $name:literal, $default:expr)),+ $(,)?) => {
        /// Known flags, in table order.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum Flag {
            $($variant),+
        }

        const FLAG_COUNT: usize = [$($name),+].len();

        static FLAGS: [FlagEntry; FLAG_COUNT] = [
            $(FlagEntry { name: $name, default: $default, cell: AtomicU8::new(OVERRIDE_NONE) }),+
        ];

        $(
            /// Flag getter; honours any installed override.
            pub fn $getter() -> bool {
                FlagProvider::instance().value_of(Flag::$variant)
            }
        )+

        fn getter_for(name: &str) -> Option<FlagGetter> {
            match name {
                $($name => Some($getter as FlagGetter),)+
                _ => None,
            }
        }

        fn flag_for(name: &str) -> Option<Flag> {
            match name {
                $($name => Some(Flag::$variant),)+
                _ => None,
            }
        }
    };
}

define_flags! {
    (TestFlag, test_flag, "test_flag", false),
    (GpuLoadUpForBlurs, gpu_load_up_for_blurs, "gpu_load_up_for_blurs", false),
    (RampDownSfPreferHighCap, ramp_down_sf_prefer_high_cap, "ramp_down_sf_prefer_high_cap", true),
}

/// Process-wide flag provider.
///
/// The provider itself is stateless; all state lives in the compiled table,
/// so construction is free and `teardown` restores compiled defaults exactly.
pub struct FlagProvider;

static PROVIDER: FlagProvider = FlagProvider;

impl FlagProvider {
    /// Shared handle to the provider.
    pub fn instance() -> &'static FlagProvider {
        &PROVIDER
    }

    /// Current value: override if installed, compiled default otherwise.
    pub fn value_of(&self, flag: Flag) -> bool {
        let entry = &FLAGS[flag as usize];
        match entry.cell.load(Ordering::Relaxed) {
            OVERRIDE_TRUE => true,
            OVERRIDE_FALSE => false,
            _ => entry.default,
        }
    }

    /// Install an override shadowing the compiled default.
    pub fn override_value(&self, flag: Flag, value: bool) {
        let cell = if value { OVERRIDE_TRUE } else { OVERRIDE_FALSE };
        FLAGS[flag as usize].cell.store(cell, Ordering::Relaxed);
    }

    /// Remove one flag's override.
    pub fn drop_override(&self, flag: Flag) {
        FLAGS[flag as usize].cell.store(OVERRIDE_NONE, Ordering::Relaxed);
    }

    /// Remove every override.
    pub fn clear_overrides(&self) {
        for entry in FLAGS.iter() {
            entry.cell.store(OVERRIDE_NONE, Ordering::Relaxed);
        }
    }

    /// Resolve a flag getter from its name.
    pub fn getter_from_string(&self, name: &str) -> Option<FlagGetter> {
        getter_for(name)
    }

    /// Resolve a flag id from its name.
    pub fn flag_from_string(&self, name: &str) -> Option<Flag> {
        flag_for(name)
    }

    /// Restore compiled defaults. Test hook.
    pub fn teardown() {
        PROVIDER.clear_overrides();
    }

    pub fn dump(&self, w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "========== Begin FlagProvider flags ==========")?;
        for entry in FLAGS.iter() {
            let value = match entry.cell.load(Ordering::Relaxed) {
                OVERRIDE_TRUE => true,
                OVERRIDE_FALSE => false,
                _ => entry.default,
            };
            writeln!(w, "{} : {}", entry.name, value)?;
        }
        writeln!(w, "========== End FlagProvider flags ==========")
    }
}

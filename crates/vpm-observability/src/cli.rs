// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-crate debug switches.

use clap::Args;

/// Debug logging toggles, one per workspace crate.
#[derive(Args, Debug, Clone, Default)]
pub struct DebugFlags {
    /// Debug logs from the hint dispatch core.
    #[arg(long)]
    pub debug_core: bool,

    /// Debug logs from the haptic engine.
    #[arg(long)]
    pub debug_haptics: bool,

    /// Debug logs from the configuration loader.
    #[arg(long)]
    pub debug_config: bool,

    /// Debug logs everywhere.
    #[arg(long)]
    pub debug_all: bool,
}

impl DebugFlags {
    /// Build the `EnvFilter` directive string for these switches.
    pub fn to_filter_string(&self) -> String {
        if self.debug_all {
            return "debug".to_string();
        }
        let mut directives = vec!["info".to_string()];
        if self.debug_core {
            directives.push("vpm_core=debug".to_string());
        }
        if self.debug_haptics {
            directives.push("vpm_haptics=debug".to_string());
        }
        if self.debug_config {
            directives.push("vpm_config=debug".to_string());
        }
        directives.join(",")
    }
}

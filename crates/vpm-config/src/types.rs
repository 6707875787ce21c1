// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Catalog schema.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_capacity() -> usize {
    vpm_core::DEFAULT_REQUEST_CAPACITY
}

/// Write back-end of a catalog node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Sysfs-style file endpoint.
    File,
    /// Process-global property.
    Property,
    /// In-memory sink for tests.
    Test,
}

/// One tunable endpoint as declared by the boot configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCatalogEntry {
    pub name: String,
    pub kind: NodeKind,
    /// Path for file nodes, key for property nodes.
    pub endpoint: String,
    /// Ordered candidate values; index 0 is the reset value.
    pub values: Vec<String>,
    #[serde(default)]
    pub reset_on_init: bool,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Haptics wiring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HapticsConfig {
    /// Root of the actuator driver's sysfs directory.
    #[serde(default)]
    pub sysfs_base: Option<PathBuf>,
    /// Persisted calibration file.
    #[serde(default)]
    pub cal_file: Option<PathBuf>,
}

/// Full boot catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub nodes: Vec<NodeCatalogEntry>,
    #[serde(default)]
    pub haptics: HapticsConfig,
}

// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Catalog loading and node instantiation.

use std::path::{Path, PathBuf};

use tracing::info;

use vpm_core::node::{FileNode, Node, PropertyNode, TestNode};

use crate::validation::validate_catalog;
use crate::{Catalog, ConfigError, NodeKind};

/// Environment variable overriding the catalog location.
pub const CONFIG_PATH_ENV: &str = "VPM_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "vpm.toml";

/// Resolve the catalog path: explicit argument, then `VPM_CONFIG`, then the
/// working-directory default.
pub fn find_config_file(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Load and validate a catalog.
pub fn load_catalog(explicit: Option<&Path>) -> Result<Catalog, ConfigError> {
    let path = find_config_file(explicit);
    let raw = std::fs::read_to_string(&path)
        .map_err(|_| ConfigError::FileNotFound(path.display().to_string()))?;
    let catalog: Catalog = toml::from_str(&raw)?;
    validate_catalog(&catalog)?;
    info!(path = %path.display(), nodes = catalog.nodes.len(), "catalog loaded");
    Ok(catalog)
}

/// Instantiate the node set a looper runs over.
///
/// File endpoints that cannot be opened fail the build: a missing sysfs node
/// at boot means the catalog does not match the kernel.
pub fn build_nodes(catalog: &Catalog) -> Result<Vec<Node>, ConfigError> {
    let mut nodes = Vec::with_capacity(catalog.nodes.len());
    for entry in &catalog.nodes {
        let writer: Box<dyn vpm_core::NodeWriter> = match entry.kind {
            NodeKind::File => Box::new(FileNode::open(&entry.endpoint).map_err(|e| {
                ConfigError::InvalidValue(format!(
                    "node '{}' endpoint {}: {e}",
                    entry.name, entry.endpoint
                ))
            })?),
            NodeKind::Property => Box::new(PropertyNode::new(entry.endpoint.clone())),
            NodeKind::Test => Box::new(TestNode::new()),
        };
        let node = Node::new(
            entry.name.clone(),
            entry.values.clone(),
            0,
            entry.reset_on_init,
            entry.capacity,
            writer,
        )
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
        nodes.push(node);
    }
    Ok(nodes)
}

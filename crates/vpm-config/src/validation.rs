// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Structural catalog validation.
//!
//! Everything index-shaped is checked once, at load time, so the dispatcher
//! never has to re-validate an action against a live node set.

use std::collections::HashSet;

use vpm_core::{Node, NodeAction};

use crate::{Catalog, ConfigError};

/// Reject catalogs the dispatcher could not run against.
pub fn validate_catalog(catalog: &Catalog) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for entry in &catalog.nodes {
        if entry.name.is_empty() {
            return Err(ConfigError::InvalidValue("node with empty name".to_string()));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(ConfigError::DuplicateNode(entry.name.clone()));
        }
        if entry.values.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "node '{}' declares no values",
                entry.name
            )));
        }
        if entry.endpoint.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "node '{}' declares no endpoint",
                entry.name
            )));
        }
        if entry.capacity == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "node '{}' declares zero capacity",
                entry.name
            )));
        }
    }
    Ok(())
}

/// Check a client action list against the instantiated node set.
pub fn validate_actions(actions: &[NodeAction], nodes: &[Node]) -> Result<(), ConfigError> {
    for action in actions {
        let Some(node) = nodes.get(action.node_index) else {
            return Err(ConfigError::InvalidValue(format!(
                "action references node index {} of {}",
                action.node_index,
                nodes.len()
            )));
        };
        if action.value_index >= node.value_count() {
            return Err(ConfigError::InvalidValue(format!(
                "action references value index {} of node '{}' ({} values)",
                action.value_index,
                node.name(),
                node.value_count()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NodeCatalogEntry, NodeKind};
    use std::time::Duration;
    use vpm_core::node::TestNode;

    fn entry(name: &str) -> NodeCatalogEntry {
        NodeCatalogEntry {
            name: name.to_string(),
            kind: NodeKind::Test,
            endpoint: name.to_string(),
            values: vec!["0".into(), "1".into()],
            reset_on_init: false,
            capacity: 8,
        }
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let catalog = Catalog {
            nodes: vec![entry("cpu_min"), entry("cpu_min")],
            ..Default::default()
        };
        assert!(matches!(validate_catalog(&catalog), Err(ConfigError::DuplicateNode(_))));
    }

    #[test]
    fn empty_values_are_rejected() {
        let mut bad = entry("cpu_min");
        bad.values.clear();
        let catalog = Catalog { nodes: vec![bad], ..Default::default() };
        assert!(matches!(validate_catalog(&catalog), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn well_formed_catalog_passes() {
        let catalog = Catalog {
            nodes: vec![entry("cpu_min"), entry("cpu_max")],
            ..Default::default()
        };
        assert!(validate_catalog(&catalog).is_ok());
    }

    #[test]
    fn actions_validate_against_nodes() {
        let nodes = vec![Node::new(
            "cpu_min",
            vec!["0".into(), "1".into()],
            0,
            false,
            8,
            Box::new(TestNode::new()),
        )
        .expect("valid node")];
        assert!(validate_actions(&[NodeAction::new(0, 1, Duration::ZERO)], &nodes).is_ok());
        assert!(validate_actions(&[NodeAction::new(1, 0, Duration::ZERO)], &nodes).is_err());
        assert!(validate_actions(&[NodeAction::new(0, 2, Duration::ZERO)], &nodes).is_err());
    }
}

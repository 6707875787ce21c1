// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # VPM configuration
//!
//! Boot-time node catalog: a TOML document declaring every tunable endpoint
//! (name, back-end kind, candidate values) plus the haptics wiring. Loading
//! validates the structure once so the dispatcher can trust indices at
//! runtime.

pub mod loader;
pub mod types;
pub mod validation;

pub use loader::{build_nodes, find_config_file, load_catalog, CONFIG_PATH_ENV};
pub use types::{Catalog, HapticsConfig, NodeCatalogEntry, NodeKind};
pub use validation::{validate_actions, validate_catalog};

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(String),

    #[error("invalid TOML syntax: {0}")]
    ParseError(String),

    #[error("duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

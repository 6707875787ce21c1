// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Haptics error types.

use thiserror::Error;

/// Errors surfaced by composition and the actuator runtime.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HapticsError {
    /// Out-of-range scale, frequency, duration or count.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A device write failed or a composed string exceeded hardware limits.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// The feature is disabled by capability or calibration.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A prior asynchronous activation has not reported idle yet.
    #[error("busy: {0}")]
    Busy(String),

    /// Internal inconsistency.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for haptics operations.
pub type HapticsResult<T> = Result<T, HapticsError>;

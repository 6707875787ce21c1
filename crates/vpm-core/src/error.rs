// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core error types shared by the node and dispatch layers.

use thiserror::Error;

/// Errors surfaced by the hint dispatch core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Caller supplied an out-of-range index or malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A hardware-facing endpoint rejected an operation.
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Non-fatal internal inconsistency (pool exhaustion, flag table mismatch).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

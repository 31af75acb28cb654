// SPDX-License-Identifier: BUSL-1.1
// Copyright 2025 Alfred Jean LLC

//! Error taxonomy. `ErrorCode` is the closed set of codes that can appear on
//! a [`crate::types::OperationTicket`] or [`crate::types::CompletionEvent`];
//! `FacadeError` is the only place a misuse (use-before-initialize /
//! after-shutdown) surfaces as a Rust `Result::Err` rather than a receipt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The closed set of error codes the core can report, rendered as
/// `PREFIX####` (e.g. `OWN2001`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Ownership conflict or non-owner operation.
    OwnershipConflict,
    /// Illegal state transition, or an invalid configuration value.
    IllegalTransition,
    /// An invalid configuration value was supplied (same surface as
    /// `IllegalTransition`, distinguished for callers that care).
    InvalidConfiguration,
    /// Caller cancelled the request, or the scheduler is shutting down.
    Cancelled,
    /// The per-operation timeout elapsed before the adapter call finished.
    TimedOut,
    /// The adapter raised an unexpected fault.
    HardwareFault,
}

impl ErrorCode {
    pub fn prefix(self) -> &'static str {
        match self {
            ErrorCode::OwnershipConflict => "OWN",
            ErrorCode::IllegalTransition | ErrorCode::InvalidConfiguration => "ARG",
            ErrorCode::Cancelled => "CT",
            ErrorCode::TimedOut => "CT",
            ErrorCode::HardwareFault => "HW",
        }
    }

    pub fn number(self) -> u32 {
        match self {
            ErrorCode::OwnershipConflict => 2001,
            ErrorCode::IllegalTransition => 3001,
            ErrorCode::InvalidConfiguration => 3001,
            ErrorCode::Cancelled => 1,
            ErrorCode::TimedOut => 2,
            ErrorCode::HardwareFault => 1001,
        }
    }

    pub fn as_code_str(self) -> String {
        format!("{}{:04}", self.prefix(), self.number())
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_code_str())
    }
}

/// Misuse error surfaced at the façade boundary only — `ARG3002` in the
/// taxonomy table. Every other code flows through receipts and events.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FacadeError {
    #[error("ARG3002: broker used before initialize() or after shutdown()")]
    NotInitialized,
    #[error("OWN2001: no free resource available for a new session")]
    NoResourceAvailable,
    #[error("{0}")]
    InvalidConfiguration(String),
}

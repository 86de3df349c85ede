// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Tollgate metering subsystem.

use thiserror::Error;

use crate::types::BudgetKillEvent;

/// The primary error type used across Tollgate crates.
#[derive(Debug, Error)]
pub enum TollgateError {
    /// Configuration errors (invalid rule sets, bad option combinations).
    #[error("configuration error: {0}")]
    Config(String),

    /// The model has no entry in the effective pricing catalog.
    ///
    /// Surfaced only under the `Error` unknown-model policy; the `Zero`
    /// policy records the call with zero cost instead.
    #[error("no pricing entry found for model: {model}")]
    UnknownModel { model: String },

    /// A budget rule's rolling-window usage exceeded its limit.
    ///
    /// Carries the kill event that triggered the abort. Surfaced only when
    /// kill-throwing is enabled on the guard.
    #[error(
        "budget exceeded for {}: limit ${:.6}, usage ${:.6}",
        .event.scope_key,
        .event.limit_usd,
        .event.usage_usd
    )]
    BudgetExceeded { event: BudgetKillEvent },

    /// Ledger backend errors, propagated unchanged from the adapter.
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Instrumented client errors (transport failure, malformed response).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl TollgateError {
    /// Returns the kill event if this is a `BudgetExceeded` error.
    pub fn kill_event(&self) -> Option<&BudgetKillEvent> {
        match self {
            Self::BudgetExceeded { event } => Some(event),
            _ => None,
        }
    }
}

// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Tollgate metering subsystem.
//!
//! This crate provides the foundational types, the error enum, and the
//! [`UsageLedger`] trait that pluggable event stores implement. The guard
//! façade, policy engine, and instrumentation layer live in
//! `tollgate-guard`; the in-memory reference ledger lives in
//! `tollgate-storage`.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::TollgateError;
pub use traits::UsageLedger;
pub use types::{
    BudgetAlert, BudgetKillEvent, BudgetRule, EventFilter, ScopeMode, TrackRequest, TrackResult,
    UsageEvent, UsageFilter, UsageSummary,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_exceeded_display_carries_scope_and_amounts() {
        let rule = BudgetRule::new(1.0, 60_000).with_id("global");
        let err = TollgateError::BudgetExceeded {
            event: BudgetKillEvent {
                rule,
                usage_usd: 1.5,
                limit_usd: 1.0,
                scope_key: "global|global".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("global|global"), "got: {msg}");
        assert!(msg.contains("$1.000000"), "got: {msg}");
        assert!(msg.contains("$1.500000"), "got: {msg}");
        assert!(err.kill_event().is_some());
    }

    #[test]
    fn unknown_model_display_names_the_model() {
        let err = TollgateError::UnknownModel {
            model: "mystery-model".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no pricing entry found for model: mystery-model"
        );
        assert!(err.kill_event().is_none());
    }

    #[test]
    fn storage_error_wraps_source() {
        let err = TollgateError::Storage {
            source: Box::new(std::io::Error::other("disk gone")),
        };
        assert!(err.to_string().contains("disk gone"));
    }
}

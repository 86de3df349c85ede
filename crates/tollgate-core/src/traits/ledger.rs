// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Usage ledger trait for pluggable event stores.

use async_trait::async_trait;

use crate::error::TollgateError;
use crate::types::{EventFilter, UsageEvent};

/// Append-only, time-ordered store of usage events.
///
/// Implementations must keep stored events in non-decreasing `created_at`
/// order: when a caller-supplied timestamp would run backwards, the ledger
/// clamps the stored event's `created_at` up to its own last-assigned
/// value. Window queries rely on this ordering for range narrowing.
///
/// Adapters backed by external stores surface failures as
/// [`TollgateError::Storage`]. The core does not retry; retry policy
/// belongs to the adapter.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Append one event, preserving the ordering invariant.
    async fn append(&self, event: UsageEvent) -> Result<(), TollgateError>;

    /// List events matching the filter, in `created_at` order.
    ///
    /// `since`/`until` bounds are inclusive on both ends. Implementations
    /// should narrow to the contiguous time range before applying equality
    /// filters; window queries are the dominant access pattern under
    /// active budget rules.
    async fn list(&self, filter: &EventFilter) -> Result<Vec<UsageEvent>, TollgateError>;

    /// Remove all events. Test and operational utility.
    async fn reset(&self) -> Result<(), TollgateError>;
}

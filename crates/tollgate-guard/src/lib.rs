// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metering façade, budget policy engine, and call instrumentation.
//!
//! This crate provides:
//! - **Pricing**: exact-match per-model catalog with caller overrides
//! - **Policy engine**: rolling-window budget rules with 80/90/100
//!   threshold escalation and kill-switch decisions
//! - **[`CostGuard`]**: one `record` call prices, appends, evaluates, and
//!   delivers alerts/kills synchronously
//! - **Instrumentation**: typed [`RemoteCall`] decorators that meter every
//!   call through a wrapped client surface

pub mod guard;
pub mod instrument;
pub mod pricing;

mod policy;

pub use guard::{Clock, CostGuard, GuardConfig, Subscription, UnknownModelPolicy};
pub use instrument::{AttributionFn, CallAttribution, Metered, RemoteCall, WrapOptions};
pub use pricing::{ModelPricing, PricingCatalog};

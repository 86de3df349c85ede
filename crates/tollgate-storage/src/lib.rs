// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reference ledger implementation for Tollgate.
//!
//! Provides [`MemoryLedger`], the in-memory event store used by default
//! when no pluggable backend is supplied to the guard. Durable backends
//! implement [`tollgate_core::UsageLedger`] against their own store.

pub mod memory;

pub use memory::MemoryLedger;

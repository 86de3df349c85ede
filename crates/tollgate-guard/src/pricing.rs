// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model pricing catalog and cost calculation.
//!
//! Prices are USD per million tokens, split into input and output rates.
//! The built-in table covers the major hosted providers; callers overlay
//! their own entries per model at guard construction. Lookups are exact
//! matches on the model identifier.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Per-model pricing in USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Cost per million input tokens.
    pub input_per_million_usd: f64,
    /// Cost per million output tokens.
    pub output_per_million_usd: f64,
}

impl ModelPricing {
    /// Shorthand constructor used by the built-in table.
    pub const fn per_million(input: f64, output: f64) -> Self {
        Self {
            input_per_million_usd: input,
            output_per_million_usd: output,
        }
    }
}

/// Built-in pricing entries.
const BUILT_IN: &[(&str, ModelPricing)] = &[
    ("gpt-4o", ModelPricing::per_million(2.5, 10.0)),
    ("gpt-4o-mini", ModelPricing::per_million(0.15, 0.6)),
    ("gpt-4-turbo", ModelPricing::per_million(10.0, 30.0)),
    ("gpt-3.5-turbo", ModelPricing::per_million(0.5, 1.5)),
    ("gpt-4.1", ModelPricing::per_million(2.0, 8.0)),
    ("gpt-4.1-mini", ModelPricing::per_million(0.8, 3.2)),
    ("gpt-4.1-nano", ModelPricing::per_million(0.2, 0.8)),
    ("gpt-5", ModelPricing::per_million(1.25, 10.0)),
    ("gpt-5-mini", ModelPricing::per_million(0.25, 2.0)),
    ("o1", ModelPricing::per_million(15.0, 60.0)),
    ("o1-mini", ModelPricing::per_million(1.1, 4.4)),
    ("o3-mini", ModelPricing::per_million(1.1, 4.4)),
    ("claude-opus-4-20250918", ModelPricing::per_million(15.0, 75.0)),
    ("claude-sonnet-4-20250514", ModelPricing::per_million(3.0, 15.0)),
    ("claude-3-haiku", ModelPricing::per_million(0.25, 1.25)),
    ("claude-3.5-sonnet", ModelPricing::per_million(3.0, 15.0)),
    ("claude-3-5-sonnet-20241022", ModelPricing::per_million(3.0, 15.0)),
    ("claude-3.5-haiku", ModelPricing::per_million(0.8, 4.0)),
    ("claude-3-5-haiku-20241022", ModelPricing::per_million(0.8, 4.0)),
    ("claude-opus-4-6", ModelPricing::per_million(5.0, 25.0)),
    ("claude-sonnet-4-6", ModelPricing::per_million(3.0, 15.0)),
    ("gemini-1.5-pro", ModelPricing::per_million(3.5, 10.5)),
    ("gemini-1.5-flash", ModelPricing::per_million(0.35, 1.05)),
    ("gemini-2.0-flash", ModelPricing::per_million(0.1, 0.4)),
    ("gemini-2.5-pro", ModelPricing::per_million(1.25, 10.0)),
    ("gemini-2.5-flash", ModelPricing::per_million(0.3, 2.5)),
    ("gemini-2.5-flash-lite", ModelPricing::per_million(0.1, 0.4)),
    ("deepseek-chat", ModelPricing::per_million(0.27, 1.1)),
    ("deepseek-reasoner", ModelPricing::per_million(0.55, 2.19)),
    ("minimax-m2.5", ModelPricing::per_million(0.5, 1.8)),
];

/// Exact-match pricing catalog: built-in entries plus caller overrides.
#[derive(Debug, Clone)]
pub struct PricingCatalog {
    entries: HashMap<String, ModelPricing>,
}

impl PricingCatalog {
    /// Catalog containing only the built-in entries.
    pub fn built_in() -> Self {
        Self {
            entries: BUILT_IN
                .iter()
                .map(|(model, pricing)| ((*model).to_string(), *pricing))
                .collect(),
        }
    }

    /// Built-in entries with the overlay applied entry-by-entry.
    ///
    /// An overlay entry replaces the built-in entry for that model only;
    /// all other built-ins stay in effect.
    pub fn with_overrides(overlay: HashMap<String, ModelPricing>) -> Self {
        let mut catalog = Self::built_in();
        catalog.entries.extend(overlay);
        catalog
    }

    /// Look up pricing for a model identifier.
    pub fn price(&self, model: &str) -> Option<&ModelPricing> {
        self.entries.get(model)
    }

    /// Cost in USD for a call, or `None` when the model is unknown.
    pub fn cost_usd(&self, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
        let pricing = self.price(model)?;
        let input = (input_tokens as f64 / 1_000_000.0) * pricing.input_per_million_usd;
        let output = (output_tokens as f64 / 1_000_000.0) * pricing.output_per_million_usd;
        Some(input + output)
    }

    /// Iterate all entries, sorted by model identifier.
    pub fn entries_sorted(&self) -> Vec<(&str, &ModelPricing)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(model, pricing)| (model.as_str(), pricing))
            .collect();
        entries.sort_by_key(|(model, _)| *model);
        entries
    }
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::built_in()
    }
}

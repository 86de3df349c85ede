// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `tollgate status` command implementation.
//!
//! Prints the built-in pricing catalog. Runtime usage is process-local,
//! so the command carries a reminder to query usage through the guard
//! inside the host application.

use std::io::IsTerminal;

use colored::Colorize;
use serde::Serialize;

use tollgate_guard::PricingCatalog;

/// One catalog row for `--json` output.
#[derive(Debug, Serialize)]
struct PricingRow {
    model: String,
    input_per_million_usd: f64,
    output_per_million_usd: f64,
}

fn pricing_rows(catalog: &PricingCatalog) -> Vec<PricingRow> {
    catalog
        .entries_sorted()
        .into_iter()
        .map(|(model, pricing)| PricingRow {
            model: model.to_string(),
            input_per_million_usd: pricing.input_per_million_usd,
            output_per_million_usd: pricing.output_per_million_usd,
        })
        .collect()
}

fn format_usd(value: f64) -> String {
    format!("${value:.4}")
}

/// Run the `tollgate status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub fn run_status(json: bool, plain: bool) {
    let catalog = PricingCatalog::built_in();

    if json {
        let rows = pricing_rows(&catalog);
        match serde_json::to_string_pretty(&rows) {
            Ok(output) => println!("{output}"),
            Err(err) => eprintln!("tollgate: failed to render pricing: {err}"),
        }
        return;
    }

    let color = !plain && std::io::stdout().is_terminal();
    println!("Built-in pricing (USD per 1M tokens):");
    for (model, pricing) in catalog.entries_sorted() {
        let input = format_usd(pricing.input_per_million_usd);
        let output = format_usd(pricing.output_per_million_usd);
        if color {
            println!("- {}: input {}, output {}", model.cyan(), input.green(), output.green());
        } else {
            println!("- {model}: input {input}, output {output}");
        }
    }

    println!();
    println!("Runtime usage is process-local. Query usage through CostGuard::query inside your app.");
}

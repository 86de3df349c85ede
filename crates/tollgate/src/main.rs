// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tollgate - LLM spend metering and budget enforcement.
//!
//! This is the binary entry point for the Tollgate CLI.

use clap::{Parser, Subcommand};

mod status;

/// Tollgate - LLM spend metering and budget enforcement.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Show built-in model pricing.
    Status {
        /// Emit structured JSON for scripting.
        #[arg(long)]
        json: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Status { json, plain }) => status::run_status(json, plain),
        None => {
            println!("tollgate: use --help for available commands");
        }
    }
}

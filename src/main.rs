// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 capflow contributors

//! capflow - Capability Module Pipelines
//!
//! Build and run pipelines of capability modules from configuration files.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use capflow::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; logs go to stderr so stdout stays machine-readable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "capflow=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if !capflow::utils::should_use_colors() {
        colored::control::set_override(false);
    }

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            pipeline,
            flags,
            dry_run,
            format,
        } => capflow::cli::run::run(pipeline, flags, dry_run, format, cli.verbose).await,
        Commands::Validate { pipeline } => capflow::cli::validate::run(pipeline, cli.verbose).await,
        Commands::Graph { pipeline, format } => {
            capflow::cli::graph::run(pipeline, format, cli.verbose).await
        }
        Commands::Modules { format } => capflow::cli::modules::run(format, cli.verbose).await,
        Commands::Watch {
            pipeline,
            flags,
            debounce,
        } => capflow::cli::watch::run(pipeline, flags, debounce, cli.verbose).await,
    }
}

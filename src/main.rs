// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 toolflow contributors

//! toolflow - Tool and Pipeline Runner
//!
//! Run tools and composite pipelines declared in a manifest.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use toolflow::cli::{run::RunOptions, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose { "toolflow=debug" } else { "toolflow=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            tool,
            set,
            fail_fast,
            dry_run,
        } => {
            let options = RunOptions {
                tool,
                set,
                fail_fast,
                dry_run,
                manifest: cli.manifest,
                config: cli.config,
            };
            toolflow::cli::run::run(options, cli.verbose).await
        }
        Commands::Graph { tool, set, format } => {
            toolflow::cli::graph::run(tool, set, format, cli.manifest, cli.config, cli.verbose).await
        }
        Commands::Validate => toolflow::cli::validate::run(cli.manifest, cli.config, cli.verbose).await,
        Commands::Tools => toolflow::cli::tools::run(cli.manifest, cli.config, cli.verbose).await,
    }
}

// Copyright 2026 Mapscout Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use mapscout::config::{
    HarvestConfig, DEFAULT_FETCH_TIMEOUT_MS, DEFAULT_NAVIGATION_TIMEOUT_MS, DEFAULT_SETTLE_MS,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mapscout",
    about = "Mapscout: collect the source maps of every script a page loads",
    version,
    after_help = "Run 'mapscout <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a URL in headless Chromium and collect every declared source map
    Collect {
        /// The page to load
        url: String,

        /// Per-map fetch timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_FETCH_TIMEOUT_MS)]
        fetch_timeout_ms: u64,

        /// Navigation timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_NAVIGATION_TIMEOUT_MS)]
        nav_timeout_ms: u64,

        /// How long to keep the capture window open after load, in milliseconds
        #[arg(long, default_value_t = DEFAULT_SETTLE_MS)]
        settle_ms: u64,
    },
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Collect {
            url,
            fetch_timeout_ms,
            nav_timeout_ms,
            settle_ms,
        } => {
            let config = HarvestConfig {
                fetch_timeout_ms,
                navigation_timeout_ms: nav_timeout_ms,
                settle_ms,
            };
            mapscout::cli::collect_cmd::run(&url, config, cli.json).await
        }
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "mapscout",
                &mut std::io::stdout(),
            );
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "mapscout=debug" } else { "mapscout=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

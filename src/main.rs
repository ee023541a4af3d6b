// ABOUTME: CLI entry point for timeseries-replicator
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Parser, Subcommand};
use timeseries_replicator::commands;

#[derive(Parser)]
#[command(name = "timeseries-replicator")]
#[command(about = "Incremental time-series-to-observation-store replication CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one synchronization pass from the source to the target store
    Sync {
        #[command(flatten)]
        args: commands::sync::SyncArgs,
    },
    /// Manage the persisted continuation token
    Token {
        #[command(flatten)]
        args: commands::token::TokenArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // We need to parse CLI args early to get the log level
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Commands::Sync { args } => commands::sync(args).await,
        Commands::Token { args } => commands::token::command(args).await,
    }
}

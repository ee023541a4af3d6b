// ABOUTME: Token subcommand - inspect or override the persisted continuation token
// ABOUTME: Mirrors the state file; clearing forces the next run to start from scratch

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::source::models::ChangeToken;
use crate::state;

#[derive(Args)]
pub struct TokenArgs {
    #[command(subcommand)]
    command: TokenCommands,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Set the persisted continuation token (RFC 3339 timestamp)
    Set {
        /// The token value, e.g. 2026-03-01T12:00:00Z
        value: String,
    },
    /// Clear the persisted continuation token (next run is a full run)
    Clear,
    /// Show the current continuation token
    Get,
}

pub async fn command(args: TokenArgs) -> Result<()> {
    match args.command {
        TokenCommands::Set { value } => {
            let token = ChangeToken::parse(&value)?;
            let mut state = state::load();
            state.change_token = Some(token);
            state::save(&state).context("Failed to save state")?;
            println!("Continuation token set to: {}", token);
        }
        TokenCommands::Clear => {
            let mut state = state::load();
            state.change_token = None;
            state::save(&state).context("Failed to save state")?;
            println!("Continuation token cleared.");
        }
        TokenCommands::Get => {
            let state = state::load();
            match state.change_token {
                Some(token) => println!("Current continuation token: {}", token),
                None => println!("Continuation token is not set."),
            }
        }
    }
    Ok(())
}

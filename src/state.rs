// ABOUTME: Persisted run state - stores the change continuation token between runs
// ABOUTME: A missing or unreadable state file means "no prior token", never an error

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::source::models::ChangeToken;

#[derive(Serialize, Deserialize, Default)]
pub struct AppState {
    pub change_token: Option<ChangeToken>,
}

fn get_state_path() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?;
    let state_dir = home_dir.join(".timeseries-replicator");
    if !state_dir.exists() {
        fs::create_dir_all(&state_dir)?;
    }
    Ok(state_dir.join("state.json"))
}

/// Load the persisted state. Any failure (missing file, bad JSON, unreadable
/// home directory) degrades to the default state: the next run simply starts
/// without a prior token.
pub fn load() -> AppState {
    let state_path = match get_state_path() {
        Ok(path) => path,
        Err(e) => {
            tracing::warn!("Could not resolve state path, starting without a token: {}", e);
            return AppState::default();
        }
    };
    if !state_path.exists() {
        return AppState::default();
    }
    let state_file = match fs::File::open(&state_path) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!(
                "Could not open {:?}, starting without a token: {}",
                state_path,
                e
            );
            return AppState::default();
        }
    };
    match serde_json::from_reader(state_file) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(
                "Could not parse {:?}, starting without a token: {}",
                state_path,
                e
            );
            AppState::default()
        }
    }
}

pub fn save(state: &AppState) -> Result<()> {
    let state_path = get_state_path()?;
    let state_file = fs::File::create(state_path)?;
    serde_json::to_writer_pretty(state_file, state)?;
    Ok(())
}

// ABOUTME: The sync command - wires CLI arguments into a SyncEngine run
// ABOUTME: Builds clients, filter, retention table, and prints the run summary

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::filters::ChangeFilter;
use crate::retention::RetentionTable;
use crate::source::client::SourceClient;
use crate::source::models::ChangeToken;
use crate::sync::engine::{SyncEngine, SyncOptions};
use crate::target::client::TargetClient;

#[derive(Args)]
pub struct SyncArgs {
    /// Base URL of the source time-series API
    #[arg(long = "source-url")]
    pub source_url: String,
    /// Source session token (falls back to SOURCE_AUTH_TOKEN env)
    #[arg(long = "source-auth-token", env = "SOURCE_AUTH_TOKEN")]
    pub source_auth_token: Option<String>,
    /// Base URL of the target observation store
    #[arg(long = "target-url")]
    pub target_url: String,
    /// Target API key (falls back to TARGET_API_KEY env)
    #[arg(long = "target-api-key", env = "TARGET_API_KEY")]
    pub target_api_key: Option<String>,
    /// HTTP request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub http_timeout: u64,

    /// Perform every read but suppress every mutating call
    #[arg(long)]
    pub dry_run: bool,
    /// Ignore any prior token and resync everything from the beginning
    #[arg(long)]
    pub force_resync: bool,
    /// Never fall back to a full resync, even if the server expires the token
    #[arg(long)]
    pub never_resync: bool,
    /// Explicit continuation token to start from (RFC 3339)
    #[arg(long)]
    pub token: Option<String>,
    /// Ask the source to apply display rounding to point values
    #[arg(long)]
    pub apply_rounding: bool,

    /// Only sync series at this location
    #[arg(long)]
    pub location: Option<String>,
    /// Only sync series for this parameter
    #[arg(long)]
    pub parameter: Option<String>,
    /// Only sync published (true) or unpublished (false) series
    #[arg(long)]
    pub publish: Option<bool>,
    /// Only sync series with these computation identifiers (comma-separated)
    #[arg(long = "computation-id", value_delimiter = ',')]
    pub computation_ids: Vec<String>,
    /// Extended attribute filters in the form key=value (repeatable)
    #[arg(long = "extended-filter")]
    pub extended_filters: Vec<String>,
    /// Approval level names to filter points by (comma-separated)
    #[arg(long = "approval", value_delimiter = ',')]
    pub approvals: Vec<String>,
    /// Grade names to filter points by (comma-separated)
    #[arg(long = "grade", value_delimiter = ',')]
    pub grades: Vec<String>,
    /// Qualifier names to filter points by (comma-separated)
    #[arg(long = "qualifier", value_delimiter = ',')]
    pub qualifiers: Vec<String>,

    /// Retention overrides in the form period=days (repeatable, 0 = unlimited)
    #[arg(long = "retention")]
    pub retention: Vec<String>,
    /// Path to a TOML file with a [retention] table
    #[arg(long = "config")]
    pub config_path: Option<PathBuf>,
}

pub async fn sync(args: SyncArgs) -> Result<()> {
    let source = SourceClient::new(
        args.source_url.clone(),
        args.source_auth_token.clone(),
        args.http_timeout,
    )?;
    let target = TargetClient::new(
        args.target_url.clone(),
        args.target_api_key.clone(),
        args.http_timeout,
    )?;

    let filter = ChangeFilter::new(
        args.location.clone(),
        args.parameter.clone(),
        args.publish,
        args.computation_ids.clone(),
        args.extended_filters.clone(),
        args.approvals.clone(),
        args.grades.clone(),
        args.qualifiers.clone(),
    )?;

    let mut retention = RetentionTable::default();
    if let Some(ref path) = args.config_path {
        retention.apply_file(path)?;
    }
    retention.apply_overrides(&args.retention)?;

    let token_override = match args.token {
        Some(ref value) => Some(ChangeToken::parse(value).context("Invalid --token value")?),
        None => None,
    };
    let options = SyncOptions {
        dry_run: args.dry_run,
        force_resync: args.force_resync,
        never_resync: args.never_resync,
        token_override,
        apply_rounding: args.apply_rounding,
    };

    let engine = SyncEngine::new(source, target, filter, retention, options);
    let report = engine.run().await?;

    println!(
        "{}Exported {} points across {} series{}. Next token: {}",
        if args.dry_run { "[dry-run] " } else { "" },
        report.points_exported,
        report.series_exported,
        if report.full_resync {
            " (full resync)"
        } else {
            ""
        },
        report.next_token
    );
    Ok(())
}

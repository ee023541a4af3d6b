// ABOUTME: Run orchestration - token policy, per-series pipeline, counters
// ABOUTME: The new token is persisted only after every series has exported

use anyhow::{Context, Result};
use std::collections::HashMap;

use crate::filters::ChangeFilter;
use crate::retention::{Period, RetentionTable};
use crate::source::catalog::SourceCatalog;
use crate::source::client::SourceClient;
use crate::source::metadata;
use crate::source::models::{ChangeEvent, ChangeToken};
use crate::state;
use crate::sync::fetch::fetch_with_backfill;
use crate::sync::location::LocationCache;
use crate::sync::reconciler::SensorReconciler;
use crate::sync::trim::trim_to_retention;
use crate::target::client::TargetClient;

/// Caller-supplied run modes. Forced-resync and never-resync are modes of this
/// run, not persisted state.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Perform every read but suppress every mutating call.
    pub dry_run: bool,
    /// Ignore any prior token and treat all series as changed from the beginning.
    pub force_resync: bool,
    /// Never fall back to a full resync, even on server-side token expiry.
    pub never_resync: bool,
    /// Explicit token to start from instead of (or newer than) the persisted one.
    pub token_override: Option<ChangeToken>,
    /// Ask the source to apply display rounding to point values.
    pub apply_rounding: bool,
}

/// Run-level totals surfaced to the operator.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub series_exported: u64,
    pub points_exported: u64,
    pub full_resync: bool,
    pub next_token: ChangeToken,
}

pub struct SyncEngine {
    source: SourceClient,
    target: TargetClient,
    filter: ChangeFilter,
    retention: RetentionTable,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(
        source: SourceClient,
        target: TargetClient,
        filter: ChangeFilter,
        retention: RetentionTable,
        options: SyncOptions,
    ) -> Self {
        Self {
            source,
            target,
            filter,
            retention,
            options,
        }
    }

    fn starting_token(&self) -> Option<ChangeToken> {
        if self.options.force_resync {
            tracing::info!("Forced resync: ignoring any prior continuation token");
        }
        resolve_starting_token(
            self.options.force_resync,
            state::load().change_token,
            self.options.token_override,
        )
    }

    /// Execute one full synchronization run.
    ///
    /// Strictly sequential: one series at a time, one request at a time. Any
    /// error aborts before the token is persisted, so every unflushed series
    /// is reprocessed on the next run.
    pub async fn run(&self) -> Result<SyncReport> {
        self.source
            .ensure_supported_version()
            .await
            .context("Source version check failed")?;
        let filter = metadata::resolve(&self.source, &self.filter)
            .await
            .context("Filter validation failed")?;

        let token = self.starting_token();
        let catalog = SourceCatalog::new(&self.source);
        let changes = catalog
            .list_changes(token.as_ref(), &filter, self.options.never_resync)
            .await?;

        if changes.full_resync && filter.is_empty() {
            if self.options.dry_run {
                tracing::info!(
                    "[dry-run] Would clear the entire target datasource before re-populating"
                );
            } else {
                tracing::info!("Full filterless resync: clearing the target datasource");
                self.target.clear_datasource().await?;
            }
        }

        let ids: Vec<String> = changes.events.iter().map(|e| e.series_id.clone()).collect();
        let descriptors = catalog.describe_series(&ids).await?;
        let events: HashMap<&str, &ChangeEvent> = changes
            .events
            .iter()
            .map(|e| (e.series_id.as_str(), e))
            .collect();

        let reconciler = SensorReconciler::new(
            &self.source,
            &self.target,
            &self.retention,
            self.options.dry_run,
            self.options.apply_rounding,
        );
        let mut locations = LocationCache::new();
        let mut series_exported: u64 = 0;
        let mut points_exported: u64 = 0;

        for descriptor in &descriptors {
            let event = match events.get(descriptor.series_id.as_str()) {
                Some(event) => *event,
                None => {
                    // Descriptor without a change event can only happen if the
                    // source's batched describe returns extras; nothing to do.
                    continue;
                }
            };
            if event.has_attribute_change {
                tracing::debug!("Series {} also has attribute changes", descriptor.series_id);
            }

            let query_from = if changes.full_resync {
                None
            } else {
                event.first_point_changed
            };
            let period_hint = Period::from_hint(descriptor.computation_period.as_deref());

            let (mut signal, period) = fetch_with_backfill(
                &self.source,
                &descriptor.series_id,
                query_from,
                period_hint,
                &self.retention,
                self.options.apply_rounding,
            )
            .await?;
            let trimmed = trim_to_retention(&mut signal, period, &self.retention);
            tracing::debug!(
                "Series {}: {} points after trimming {} ({} retention)",
                descriptor.series_id,
                signal.point_count(),
                trimmed,
                period
            );

            let existing = self.target.find_sensor(&descriptor.series_id).await?;
            let outcome = reconciler
                .reconcile(
                    descriptor,
                    signal,
                    period,
                    existing,
                    changes.full_resync,
                    event.first_point_changed,
                    &mut locations,
                )
                .await
                .with_context(|| format!("Failed to export series {}", descriptor.series_id))?;

            series_exported += 1;
            points_exported += outcome.points_exported;
        }

        if self.options.dry_run {
            tracing::info!(
                "[dry-run] Would persist continuation token {}",
                changes.next_token
            );
        } else {
            state::save(&state::AppState {
                change_token: Some(changes.next_token),
            })
            .context("Failed to persist continuation token")?;
        }

        tracing::info!(
            "Run complete: {} series, {} points exported ({} locations cached)",
            series_exported,
            points_exported,
            locations.len()
        );
        Ok(SyncReport {
            series_exported,
            points_exported,
            full_resync: changes.full_resync,
            next_token: changes.next_token,
        })
    }
}

/// Token to start a run from. Forced resync discards everything; an explicit
/// override competes with the persisted token and the newer one wins, so a
/// stale override can never regress an already-advanced token.
pub fn resolve_starting_token(
    force_resync: bool,
    persisted: Option<ChangeToken>,
    explicit: Option<ChangeToken>,
) -> Option<ChangeToken> {
    if force_resync {
        return None;
    }
    match (persisted, explicit) {
        (Some(saved), Some(given)) => Some(saved.max(given)),
        (saved, given) => given.or(saved),
    }
}

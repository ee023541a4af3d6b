// ABOUTME: Reconciles target-side sensor state against a freshly fetched signal
// ABOUTME: Pure plan decision, then delete/create/append execution with dry-run

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::retention::{Period, RetentionTable};
use crate::source::client::SourceClient;
use crate::source::models::{SeriesDescriptor, Signal};
use crate::sync::fetch;
use crate::sync::location::LocationCache;
use crate::sync::trim::trim_to_retention;
use crate::target::client::TargetClient;
use crate::target::models::{SensorHandle, SensorState};

/// Decision for one series, computed before any mutation is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Tear down the existing sensor (and purge its tombstones) first.
    pub delete_existing: bool,
    /// The downstream history is stale at the point of change: the signal must
    /// be rebuilt from the dawn of the series before exporting.
    pub refetch_unbounded: bool,
    /// Create a fresh sensor (no sensor remains after the delete step).
    pub create_sensor: bool,
}

/// What the reconciliation ended up doing for a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    Created,
    Recreated,
    Appended,
}

impl ReconcileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileAction::Created => "created",
            ReconcileAction::Recreated => "recreated",
            ReconcileAction::Appended => "appended",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub action: ReconcileAction,
    pub points_exported: u64,
    pub state: SensorState,
}

/// Decide how to reconcile one series. Rules, in order:
/// 1. A full resync tears down whatever exists and re-creates.
/// 2. An existing sensor whose last observation is at or after the first
///    changed point holds history that is now stale; it must be destroyed and
///    rebuilt from scratch, not appended to.
/// 3. Otherwise create iff nothing exists, else append.
pub fn plan(
    existing: Option<&SensorState>,
    full_resync: bool,
    first_point_changed: Option<DateTime<Utc>>,
) -> ReconcilePlan {
    if full_resync {
        return ReconcilePlan {
            delete_existing: existing.is_some(),
            refetch_unbounded: false,
            create_sensor: true,
        };
    }
    if let (Some(sensor), Some(changed)) = (existing, first_point_changed) {
        if sensor.last_observed.is_some_and(|last| last >= changed) {
            return ReconcilePlan {
                delete_existing: true,
                refetch_unbounded: true,
                create_sensor: true,
            };
        }
    }
    ReconcilePlan {
        delete_existing: false,
        refetch_unbounded: false,
        create_sensor: existing.is_none(),
    }
}

pub struct SensorReconciler<'a> {
    source: &'a SourceClient,
    target: &'a TargetClient,
    retention: &'a RetentionTable,
    dry_run: bool,
    apply_rounding: bool,
}

impl<'a> SensorReconciler<'a> {
    pub fn new(
        source: &'a SourceClient,
        target: &'a TargetClient,
        retention: &'a RetentionTable,
        dry_run: bool,
        apply_rounding: bool,
    ) -> Self {
        Self {
            source,
            target,
            retention,
            dry_run,
            apply_rounding,
        }
    }

    /// Reconcile one series: execute the plan against the target store and
    /// upsert the signal's points. In dry-run mode every read still happens
    /// (including the unbounded refetch) but no mutating call is issued.
    #[allow(clippy::too_many_arguments)]
    pub async fn reconcile(
        &self,
        descriptor: &SeriesDescriptor,
        mut signal: Signal,
        mut period: Period,
        existing: Option<SensorState>,
        full_resync: bool,
        first_point_changed: Option<DateTime<Utc>>,
        locations: &mut LocationCache,
    ) -> Result<ReconcileOutcome> {
        let plan = plan(existing.as_ref(), full_resync, first_point_changed);

        if plan.refetch_unbounded {
            tracing::info!(
                "Series {}: downstream history is stale at the point of change; \
                rebuilding the full signal",
                descriptor.series_id
            );
            let (rebuilt, rebuilt_period) = fetch::fetch_with_backfill(
                self.source,
                &descriptor.series_id,
                None,
                period,
                self.retention,
                self.apply_rounding,
            )
            .await?;
            signal = rebuilt;
            period = rebuilt_period;
            let trimmed = trim_to_retention(&mut signal, period, self.retention);
            if trimmed > 0 {
                tracing::debug!(
                    "Series {}: trimmed {} points after rebuild",
                    descriptor.series_id,
                    trimmed
                );
            }
        }

        let location = locations.get(self.source, &descriptor.location_id).await?;

        if plan.delete_existing {
            // `existing` is always present when delete_existing is set.
            if let Some(ref sensor) = existing {
                if self.dry_run {
                    tracing::info!(
                        "[dry-run] Would delete sensor {} (series {}) and purge deleted observations",
                        sensor.handle,
                        descriptor.series_id
                    );
                } else {
                    self.target.delete_sensor(&sensor.handle).await?;
                    let purged = self.target.delete_deleted_observations().await?;
                    tracing::debug!(
                        "Deleted sensor {} and purged {} tombstoned observations",
                        sensor.handle,
                        purged
                    );
                }
            }
        }

        let (handle, action) = if plan.create_sensor {
            let action = if plan.delete_existing {
                ReconcileAction::Recreated
            } else {
                ReconcileAction::Created
            };
            if self.dry_run {
                tracing::info!(
                    "[dry-run] Would create sensor for series {} at location {}",
                    descriptor.series_id,
                    descriptor.location_id
                );
                (SensorHandle::dry_run(), action)
            } else {
                let handle = self.target.insert_sensor(descriptor, &location).await?;
                tracing::debug!(
                    "Created sensor {} for series {}",
                    handle,
                    descriptor.series_id
                );
                (handle, action)
            }
        } else {
            // Plan guarantees an existing sensor on the append path.
            let sensor = existing.clone().ok_or_else(|| {
                anyhow::anyhow!(
                    "Internal error: append path without an existing sensor for series {}",
                    descriptor.series_id
                )
            })?;
            (sensor.handle, ReconcileAction::Appended)
        };

        let points_exported = if self.dry_run {
            tracing::info!(
                "[dry-run] Would upsert {} observations for series {} ({} .. {}), action: {}",
                signal.point_count(),
                descriptor.series_id,
                signal
                    .first_timestamp()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                signal
                    .last_timestamp()
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
                action.as_str()
            );
            signal.point_count() as u64
        } else {
            let inserted = self
                .target
                .insert_observations(&handle, &location, descriptor, &signal)
                .await?;
            tracing::info!(
                "Series {}: {} {} observations under sensor {}",
                descriptor.series_id,
                action.as_str(),
                inserted,
                handle
            );
            inserted
        };

        Ok(ReconcileOutcome {
            action,
            points_exported,
            state: SensorState {
                series_id: descriptor.series_id.clone(),
                handle,
                last_observed: signal.last_timestamp(),
            },
        })
    }
}

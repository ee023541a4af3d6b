// ABOUTME: The synchronization core
// ABOUTME: Adaptive fetch, retention trimming, sensor reconciliation, run engine

pub mod engine;
pub mod fetch;
pub mod location;
pub mod reconciler;
pub mod trim;

pub use engine::{SyncEngine, SyncOptions, SyncReport};
pub use fetch::{fetch_with_backfill, infer_period, FetchWindow, FETCH_SCHEDULE};
pub use location::LocationCache;
pub use reconciler::{plan, ReconcileAction, ReconcilePlan, SensorReconciler};
pub use trim::trim_to_retention;

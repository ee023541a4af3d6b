// ABOUTME: Library root for timeseries-replicator
// ABOUTME: Exposes the sync engine, source/target clients, and shared config types

pub mod commands;
pub mod filters;
pub mod retention;
pub mod source;
pub mod state;
pub mod sync;
pub mod target;

pub use filters::ChangeFilter;
pub use retention::{Period, RetentionTable};
pub use sync::engine::{SyncEngine, SyncOptions, SyncReport};

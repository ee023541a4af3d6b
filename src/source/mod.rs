// ABOUTME: Source time-series platform integration
// ABOUTME: HTTP client, change catalog, wire models, and metadata validation

pub mod catalog;
pub mod client;
pub mod metadata;
pub mod models;

pub use catalog::{ChangeList, SourceCatalog};
pub use client::SourceClient;

// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports the sync run and token management commands

pub mod sync;
pub mod token;

pub use sync::sync;

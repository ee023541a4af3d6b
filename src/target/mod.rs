// ABOUTME: Target observation store integration
// ABOUTME: Sensor state models and the mutating HTTP client

pub mod client;
pub mod models;

pub use client::TargetClient;
pub use models::{SensorHandle, SensorState};

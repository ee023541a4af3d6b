// ABOUTME: Target-side sensor state models
// ABOUTME: A sensor is either fully present or fully absent, never partial

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity/offering handle assigned by the target store when a sensor is
/// created, required for all subsequent observation writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SensorHandle(pub String);

impl SensorHandle {
    /// Placeholder handle used when dry-run suppresses the create call.
    pub fn dry_run() -> Self {
        SensorHandle("<dry-run>".to_string())
    }
}

impl fmt::Display for SensorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Downstream representation of one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorState {
    /// Series this sensor was derived from; identity is unique per series.
    pub series_id: String,
    pub handle: SensorHandle,
    pub last_observed: Option<DateTime<Utc>>,
}

// ABOUTME: Wire and domain models for the source time-series API
// ABOUTME: Change tokens, change events, series descriptors, and point signals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque continuation cursor marking the point up to which source changes
/// have been consumed. Timestamp-shaped on the wire (RFC 3339) but treated as
/// opaque by everything except the bootstrap rule in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeToken(pub DateTime<Utc>);

impl ChangeToken {
    pub fn parse(value: &str) -> anyhow::Result<Self> {
        let instant = DateTime::parse_from_rfc3339(value)
            .map_err(|e| anyhow::anyhow!("Invalid change token '{}': {}", value, e))?;
        Ok(ChangeToken(instant.with_timezone(&Utc)))
    }
}

impl fmt::Display for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

/// One series reported as changed since the continuation token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub series_id: String,
    /// Earliest timestamp whose points changed; absent for attribute-only changes.
    pub first_point_changed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub has_attribute_change: bool,
}

/// Immutable metadata for one series, fetched in batches from the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDescriptor {
    pub series_id: String,
    pub identifier: String,
    pub location_id: String,
    #[serde(default)]
    pub utc_offset_hours: f64,
    /// Declared computation period, if the source knows one (e.g. "Daily").
    #[serde(default)]
    pub computation_period: Option<String>,
}

/// A single measurement.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub timestamp: DateTime<Utc>,
    pub value: Option<f64>,
    #[serde(default)]
    pub qualifiers: Vec<String>,
}

/// Ordered, timestamp-deduplicated sequence of points for one series, plus the
/// window it was retrieved for. Never partially persisted downstream.
#[derive(Debug, Clone)]
pub struct Signal {
    pub series_id: String,
    pub points: Vec<Point>,
    /// Start of the retrieval window; `None` means "from the dawn of the series".
    pub query_from: Option<DateTime<Utc>>,
    pub retrieved_at: DateTime<Utc>,
}

impl Signal {
    pub fn new(
        series_id: String,
        mut points: Vec<Point>,
        query_from: Option<DateTime<Utc>>,
        retrieved_at: DateTime<Utc>,
    ) -> Self {
        points.sort_by_key(|p| p.timestamp);
        points.dedup_by_key(|p| p.timestamp);
        Self {
            series_id,
            points,
            query_from,
            retrieved_at,
        }
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.first().map(|p| p.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points.last().map(|p| p.timestamp)
    }
}

/// Raw response of the changes endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResponse {
    #[serde(default)]
    pub changes: Vec<ChangeEvent>,
    pub next_token: Option<ChangeToken>,
    #[serde(default)]
    pub token_expired: bool,
    pub response_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeResponse {
    #[serde(default)]
    pub descriptors: Vec<SeriesDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsResponse {
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub num_points: u64,
}

/// A name/id pair from the source metadata lookups (approvals, grades, qualifiers).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedId {
    pub id: String,
    pub name: String,
}

/// Location metadata, cached per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationDescriptor {
    pub location_id: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    #[serde(default)]
    pub utc_offset_hours: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationInfo {
    pub descriptor: LocationDescriptor,
    #[serde(default)]
    pub extended_data: serde_json::Value,
}

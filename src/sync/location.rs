// ABOUTME: Per-run memoization of location metadata lookups
// ABOUTME: One fetch per distinct location id; no invalidation within a run

use anyhow::Result;
use std::collections::HashMap;

use crate::source::client::SourceClient;
use crate::source::models::LocationInfo;

/// Memoized location lookups, owned by the run context and passed by
/// reference into reconciliation. Runs are short relative to how often
/// location metadata changes, so entries are never invalidated.
#[derive(Default)]
pub struct LocationCache {
    entries: HashMap<String, LocationInfo>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&mut self, client: &SourceClient, location_id: &str) -> Result<LocationInfo> {
        if let Some(info) = self.entries.get(location_id) {
            return Ok(info.clone());
        }
        let info = client.get_location(location_id).await?;
        self.entries.insert(location_id.to_string(), info.clone());
        Ok(info)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ABOUTME: HTTP client for the target observation store
// ABOUTME: Sensor lookup/create/delete, observation upserts, datasource clearing

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use crate::source::models::{LocationInfo, SeriesDescriptor, Signal};
use crate::target::models::{SensorHandle, SensorState};

pub struct TargetClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl TargetClient {
    pub fn new(base_url: String, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("x-api-key", key),
            None => request,
        }
    }

    async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if status == 401 {
            anyhow::bail!(
                "Authentication with the target store failed ({}). \
                Check the --target-api-key value or TARGET_API_KEY env var",
                what
            );
        }
        anyhow::bail!("{} failed with status {}: {}", what, status, body);
    }

    /// Look up the existing sensor for a series, if one was ever exported.
    ///
    /// Sensor identity is derived uniquely per series; a sensor answering for
    /// this series but claiming a different origin series is a collision and
    /// an error, not something to silently reconcile over.
    pub async fn find_sensor(&self, series_id: &str) -> Result<Option<SensorState>> {
        let url = format!("{}/sensors/find", self.base_url);
        let response = self
            .authed(
                self.client
                    .post(&url)
                    .json(&serde_json::json!({ "seriesId": series_id })),
            )
            .send()
            .await
            .context("Failed to look up existing sensor")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response, "Sensor lookup").await?;
        let state: SensorState = response
            .json()
            .await
            .context("Failed to parse sensor lookup response")?;

        if state.series_id != series_id {
            anyhow::bail!(
                "Sensor identity collision: lookup for series {} returned sensor {} \
                owned by series {}",
                series_id,
                state.handle,
                state.series_id
            );
        }
        Ok(Some(state))
    }

    /// Create the sensor for a series and return its newly assigned handle.
    pub async fn insert_sensor(
        &self,
        descriptor: &SeriesDescriptor,
        location: &LocationInfo,
    ) -> Result<SensorHandle> {
        #[derive(serde::Deserialize)]
        struct InsertResponse {
            handle: SensorHandle,
        }

        let url = format!("{}/sensors", self.base_url);
        let response = self
            .authed(self.client.post(&url).json(&serde_json::json!({
                "seriesId": descriptor.series_id,
                "identifier": descriptor.identifier,
                "utcOffsetHours": descriptor.utc_offset_hours,
                "location": location,
            })))
            .send()
            .await
            .context("Failed to create sensor")?;
        let response = Self::check_status(response, "Sensor creation").await?;
        let parsed: InsertResponse = response
            .json()
            .await
            .context("Failed to parse sensor creation response")?;
        Ok(parsed.handle)
    }

    pub async fn delete_sensor(&self, handle: &SensorHandle) -> Result<()> {
        let url = format!("{}/sensors/{}", self.base_url, handle);
        let response = self
            .authed(self.client.delete(&url))
            .send()
            .await
            .context("Failed to delete sensor")?;
        Self::check_status(response, "Sensor deletion").await?;
        Ok(())
    }

    /// Purge the tombstones a sensor deletion leaves behind. Must run between
    /// a delete and the re-create of the same identity.
    pub async fn delete_deleted_observations(&self) -> Result<u64> {
        #[derive(serde::Deserialize)]
        struct PurgeResponse {
            #[serde(default)]
            purged: u64,
        }

        let url = format!("{}/observations/purge-deleted", self.base_url);
        let response = self
            .authed(self.client.post(&url))
            .send()
            .await
            .context("Failed to purge deleted observations")?;
        let response = Self::check_status(response, "Deleted-observation purge").await?;
        let parsed: PurgeResponse = response
            .json()
            .await
            .context("Failed to parse purge response")?;
        Ok(parsed.purged)
    }

    /// Upsert the signal's points as observations under the given handle.
    pub async fn insert_observations(
        &self,
        handle: &SensorHandle,
        location: &LocationInfo,
        descriptor: &SeriesDescriptor,
        signal: &Signal,
    ) -> Result<u64> {
        #[derive(serde::Deserialize)]
        struct UpsertResponse {
            #[serde(default)]
            inserted: u64,
        }

        let url = format!("{}/sensors/{}/observations", self.base_url, handle);
        let response = self
            .authed(self.client.post(&url).json(&serde_json::json!({
                "seriesId": descriptor.series_id,
                "identifier": descriptor.identifier,
                "location": location,
                "points": signal.points,
            })))
            .send()
            .await
            .context("Failed to upsert observations")?;
        let response = Self::check_status(response, "Observation upsert").await?;
        let parsed: UpsertResponse = response
            .json()
            .await
            .context("Failed to parse observation upsert response")?;
        Ok(parsed.inserted)
    }

    /// Wipe the entire target datasource. Only issued on a full, filterless
    /// resync before re-populating.
    pub async fn clear_datasource(&self) -> Result<()> {
        let url = format!("{}/datasource/clear", self.base_url);
        let response = self
            .authed(self.client.post(&url))
            .send()
            .await
            .context("Failed to clear target datasource")?;
        Self::check_status(response, "Datasource clear").await?;
        Ok(())
    }
}

// ABOUTME: HTTP client for the source time-series API
// ABOUTME: Raw operations: changes, series descriptions, points, metadata lookups

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::time::{Duration, Instant};

use crate::filters::ChangeFilter;
use crate::source::models::{
    ChangeToken, ChangesResponse, DescribeResponse, LocationInfo, NamedId, PointsResponse,
    SeriesDescriptor, Signal,
};

/// Oldest source API major version this tool can speak to.
pub const MIN_SUPPORTED_MAJOR_VERSION: u32 = 3;

pub struct SourceClient {
    client: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl SourceClient {
    pub fn new(base_url: String, auth_token: Option<String>, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth_token {
            Some(ref token) => request.header("X-Auth-Token", token),
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
                "Authentication with the source API failed ({}). \
                Check the --source-auth-token value or SOURCE_AUTH_TOKEN env var",
                what
            );
        }
        anyhow::bail!("{} failed with status {}: {}", what, status, body);
    }

    /// Verify the source server speaks a supported API version.
    pub async fn ensure_supported_version(&self) -> Result<()> {
        #[derive(serde::Deserialize)]
        struct VersionResponse {
            version: String,
        }

        let url = format!("{}/version", self.base_url);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .context("Failed to query source API version")?;
        let response = Self::check_status(response, "Version query").await?;
        let parsed: VersionResponse = response
            .json()
            .await
            .context("Failed to parse version response")?;

        let major: u32 = parsed
            .version
            .split('.')
            .next()
            .unwrap_or("0")
            .parse()
            .unwrap_or(0);
        if major < MIN_SUPPORTED_MAJOR_VERSION {
            anyhow::bail!(
                "Source API version {} is not supported (need {}.x or newer)",
                parsed.version,
                MIN_SUPPORTED_MAJOR_VERSION
            );
        }
        tracing::debug!("Source API version {}", parsed.version);
        Ok(())
    }

    /// Fetch the changed-series list, returning the raw response together with
    /// the request round-trip time (needed for token bootstrapping).
    pub async fn list_changes(
        &self,
        token: Option<&ChangeToken>,
        filter: &ChangeFilter,
    ) -> Result<(ChangesResponse, Duration)> {
        let url = format!("{}/series/changes", self.base_url);
        let started = Instant::now();
        let response = self
            .authed(self.client.get(&url).query(&filter.to_query(token)))
            .send()
            .await
            .context("Failed to query changed series from source")?;
        let response = Self::check_status(response, "Changes query").await?;
        let parsed: ChangesResponse = response
            .json()
            .await
            .context("Failed to parse changes response")?;
        Ok((parsed, started.elapsed()))
    }

    /// Fetch descriptors for one batch of series ids. Sent as POST with a
    /// GET-semantics override so large id lists don't blow the URL length cap.
    pub async fn describe_series_batch(&self, ids: &[String]) -> Result<Vec<SeriesDescriptor>> {
        let url = format!("{}/series/describe", self.base_url);
        let response = self
            .authed(
                self.client
                    .post(&url)
                    .header("X-HTTP-Method-Override", "GET")
                    .json(&serde_json::json!({ "seriesIds": ids })),
            )
            .send()
            .await
            .context("Failed to query series descriptions from source")?;
        let response = Self::check_status(response, "Series description query").await?;
        let parsed: DescribeResponse = response
            .json()
            .await
            .context("Failed to parse series description response")?;
        Ok(parsed.descriptors)
    }

    /// Fetch points for one series from `query_from` (or the dawn of the
    /// series when `None`) to now.
    pub async fn get_points(
        &self,
        series_id: &str,
        query_from: Option<DateTime<Utc>>,
        apply_rounding: bool,
    ) -> Result<Signal> {
        let url = format!("{}/series/{}/points", self.base_url, series_id);
        let mut request = self.client.get(&url);
        if let Some(from) = query_from {
            request = request.query(&[("from", from.to_rfc3339())]);
        }
        if apply_rounding {
            request = request.query(&[("rounded", "true")]);
        }
        let response = self
            .authed(request)
            .send()
            .await
            .with_context(|| format!("Failed to fetch points for series {}", series_id))?;
        let response = Self::check_status(response, "Points query").await?;
        let parsed: PointsResponse = response
            .json()
            .await
            .context("Failed to parse points response")?;

        tracing::debug!(
            "Fetched {} points for series {} (from {:?})",
            parsed.points.len(),
            series_id,
            query_from
        );
        Ok(Signal::new(
            series_id.to_string(),
            parsed.points,
            query_from,
            Utc::now(),
        ))
    }

    async fn list_named(&self, path: &str, what: &str) -> Result<Vec<NamedId>> {
        #[derive(serde::Deserialize)]
        struct Listing {
            #[serde(default)]
            items: Vec<NamedId>,
        }

        let url = format!("{}/metadata/{}", self.base_url, path);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to list {} from source", what))?;
        let response = Self::check_status(response, what).await?;
        let parsed: Listing = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} listing", what))?;
        Ok(parsed.items)
    }

    pub async fn list_approvals(&self) -> Result<Vec<NamedId>> {
        self.list_named("approvals", "Approval listing").await
    }

    pub async fn list_grades(&self) -> Result<Vec<NamedId>> {
        self.list_named("grades", "Grade listing").await
    }

    pub async fn list_qualifiers(&self) -> Result<Vec<NamedId>> {
        self.list_named("qualifiers", "Qualifier listing").await
    }

    pub async fn get_location(&self, location_id: &str) -> Result<LocationInfo> {
        let url = format!("{}/locations/{}", self.base_url, location_id);
        let response = self
            .authed(self.client.get(&url))
            .send()
            .await
            .with_context(|| format!("Failed to fetch location {}", location_id))?;
        let response = Self::check_status(response, "Location query").await?;
        let parsed: LocationInfo = response
            .json()
            .await
            .context("Failed to parse location response")?;
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = SourceClient::new("https://source.example.com/api/".to_string(), None, 30);
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url, "https://source.example.com/api");
    }

    #[test]
    fn test_client_creation_with_auth_token() {
        let client = SourceClient::new(
            "https://source.example.com".to_string(),
            Some("session-token".to_string()),
            30,
        );
        assert!(client.is_ok());
    }
}

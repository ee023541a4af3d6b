// ABOUTME: Change catalog over the raw source client
// ABOUTME: Owns token bootstrap/expiry rules and batched descriptor aggregation

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

use crate::filters::ChangeFilter;
use crate::source::client::SourceClient;
use crate::source::models::{ChangeEvent, ChangeToken, SeriesDescriptor};

/// Descriptor batch size per describe call. The describe endpoint takes the id
/// list in a POST body, so the cap exists to bound response sizes, not URLs.
pub const DESCRIBE_BATCH_SIZE: usize = 400;

/// Safety margin subtracted when bootstrapping a token from the server's
/// response time, covering clock skew between client and server.
const BOOTSTRAP_MARGIN: i64 = 60;

/// Result of one changes query, with the token already resolved for the next run.
#[derive(Debug, Clone)]
pub struct ChangeList {
    pub events: Vec<ChangeEvent>,
    pub next_token: ChangeToken,
    /// True when the succeeded query carried no token, i.e. the source
    /// reported every series as changed from the beginning.
    pub full_resync: bool,
}

/// Derive a continuation token when the server did not hand one back.
/// `response_time − request_duration − 1 minute` guarantees the next run's
/// starting point predates any point generated during this request's latency.
pub fn bootstrap_token(
    response_time: DateTime<Utc>,
    request_duration: std::time::Duration,
) -> ChangeToken {
    let elapsed = Duration::from_std(request_duration).unwrap_or_else(|_| Duration::seconds(0));
    ChangeToken(response_time - elapsed - Duration::seconds(BOOTSTRAP_MARGIN))
}

pub struct SourceCatalog<'a> {
    client: &'a SourceClient,
}

impl<'a> SourceCatalog<'a> {
    pub fn new(client: &'a SourceClient) -> Self {
        Self { client }
    }

    /// Query the changed-series list since `token`.
    ///
    /// If the server reports the token expired, the query is re-issued with no
    /// token (full resync) unless `never_resync` is set, in which case the
    /// expired-token result is used as-is with a warning.
    pub async fn list_changes(
        &self,
        token: Option<&ChangeToken>,
        filter: &ChangeFilter,
        never_resync: bool,
    ) -> Result<ChangeList> {
        let (mut response, mut elapsed) = self.client.list_changes(token, filter).await?;
        let mut full_resync = token.is_none();

        if response.token_expired && token.is_some() {
            if never_resync {
                tracing::warn!(
                    "Continuation token has expired on the server but --never-resync is set; \
                    proceeding with the (possibly incomplete) expired-token result"
                );
            } else {
                tracing::warn!(
                    "Continuation token has expired on the server; falling back to a full resync"
                );
                let (resynced, resync_elapsed) = self.client.list_changes(None, filter).await?;
                response = resynced;
                elapsed = resync_elapsed;
                full_resync = true;
            }
        }

        let next_token = match response.next_token {
            Some(token) => token,
            None => {
                let token = bootstrap_token(response.response_time, elapsed);
                tracing::debug!("Source returned no token; bootstrapped {}", token);
                token
            }
        };

        tracing::info!(
            "Source reports {} changed series{}",
            response.changes.len(),
            if full_resync { " (full resync)" } else { "" }
        );
        Ok(ChangeList {
            events: response.changes,
            next_token,
            full_resync,
        })
    }

    /// Fetch descriptors for the given series ids, batched at
    /// `DESCRIBE_BATCH_SIZE` per call and sorted by (location, identifier) so
    /// downstream processing order is deterministic.
    pub async fn describe_series(&self, ids: &[String]) -> Result<Vec<SeriesDescriptor>> {
        let mut descriptors = Vec::with_capacity(ids.len());
        for batch in ids.chunks(DESCRIBE_BATCH_SIZE) {
            let mut fetched = self.client.describe_series_batch(batch).await?;
            descriptors.append(&mut fetched);
        }
        descriptors.sort_by(|a, b| {
            (a.location_id.as_str(), a.identifier.as_str())
                .cmp(&(b.location_id.as_str(), b.identifier.as_str()))
        });
        Ok(descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_bootstrap_token_subtracts_latency_and_margin() {
        let response_time = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let token = bootstrap_token(response_time, std::time::Duration::from_secs(5));
        assert_eq!(
            token.0,
            Utc.with_ymd_and_hms(2026, 3, 1, 11, 58, 55).unwrap()
        );
        // Never later than responseTime − duration − 1 minute.
        assert!(token.0 <= response_time - Duration::seconds(5) - Duration::seconds(60));
    }

    #[test]
    fn test_bootstrap_token_zero_latency() {
        let response_time = Utc.with_ymd_and_hms(2026, 3, 1, 12, 1, 0).unwrap();
        let token = bootstrap_token(response_time, std::time::Duration::ZERO);
        assert_eq!(token.0, Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    }
}

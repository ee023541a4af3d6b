// ABOUTME: Change-query filter surface passed through to the source catalog
// ABOUTME: Values are normalized by metadata validation before the first catalog call

use anyhow::{bail, Result};

use crate::source::models::ChangeToken;

/// Filters applied to the source "changes since" query. Name-valued fields
/// (approvals, grades, qualifiers) hold human-readable names until
/// `source::metadata::resolve` replaces them with canonical identifiers.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    pub location_id: Option<String>,
    pub parameter: Option<String>,
    pub publish: Option<bool>,
    pub computation_ids: Vec<String>,
    pub extended_filters: Vec<(String, String)>,
    pub approvals: Vec<String>,
    pub grades: Vec<String>,
    pub qualifiers: Vec<String>,
}

impl ChangeFilter {
    /// Creates a filter from CLI arguments, validating the extended
    /// `key=value` pair format up front.
    pub fn new(
        location_id: Option<String>,
        parameter: Option<String>,
        publish: Option<bool>,
        computation_ids: Vec<String>,
        extended_pairs: Vec<String>,
        approvals: Vec<String>,
        grades: Vec<String>,
        qualifiers: Vec<String>,
    ) -> Result<Self> {
        let mut extended_filters = Vec::with_capacity(extended_pairs.len());
        for pair in extended_pairs {
            match pair.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    extended_filters.push((key.trim().to_string(), value.trim().to_string()));
                }
                _ => bail!(
                    "Extended filter must be specified as 'key=value', got '{}'",
                    pair
                ),
            }
        }
        Ok(Self {
            location_id,
            parameter,
            publish,
            computation_ids,
            extended_filters,
            approvals,
            grades,
            qualifiers,
        })
    }

    /// Checks if any filters are active. A filterless full resync is the only
    /// run allowed to clear the whole target datasource.
    pub fn is_empty(&self) -> bool {
        self.location_id.is_none()
            && self.parameter.is_none()
            && self.publish.is_none()
            && self.computation_ids.is_empty()
            && self.extended_filters.is_empty()
            && self.approvals.is_empty()
            && self.grades.is_empty()
            && self.qualifiers.is_empty()
    }

    /// Render the filter (plus optional continuation token) as query
    /// parameters for the changes endpoint. Values are passed through
    /// unmodified; normalization happened earlier.
    pub fn to_query(&self, token: Option<&ChangeToken>) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if let Some(token) = token {
            params.push(("since".to_string(), token.to_string()));
        }
        if let Some(ref location) = self.location_id {
            params.push(("locationId".to_string(), location.clone()));
        }
        if let Some(ref parameter) = self.parameter {
            params.push(("parameter".to_string(), parameter.clone()));
        }
        if let Some(publish) = self.publish {
            params.push(("publish".to_string(), publish.to_string()));
        }
        for id in &self.computation_ids {
            params.push(("computationId".to_string(), id.clone()));
        }
        for (key, value) in &self.extended_filters {
            params.push(("extended".to_string(), format!("{}={}", key, value)));
        }
        for approval in &self.approvals {
            params.push(("approval".to_string(), approval.clone()));
        }
        for grade in &self.grades {
            params.push(("grade".to_string(), grade.clone()));
        }
        for qualifier in &self.qualifiers {
            params.push(("qualifier".to_string(), qualifier.clone()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter() {
        let filter = ChangeFilter::default();
        assert!(filter.is_empty());
        assert!(filter.to_query(None).is_empty());
    }

    #[test]
    fn test_extended_filter_format_validated() {
        let err = ChangeFilter::new(
            None,
            None,
            None,
            Vec::new(),
            vec!["badpair".to_string()],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert!(err.is_err());

        let err = ChangeFilter::new(
            None,
            None,
            None,
            Vec::new(),
            vec!["=value".to_string()],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_to_query_includes_token_and_filters() {
        let filter = ChangeFilter::new(
            Some("loc-1".to_string()),
            Some("Stage".to_string()),
            Some(true),
            vec!["comp-1".to_string()],
            vec!["region=west".to_string()],
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
        .unwrap();
        assert!(!filter.is_empty());

        let token = ChangeToken::parse("2026-03-01T00:00:00Z").unwrap();
        let params = filter.to_query(Some(&token));
        assert!(params.iter().any(|(k, _)| k == "since"));
        assert!(params.contains(&("locationId".to_string(), "loc-1".to_string())));
        assert!(params.contains(&("publish".to_string(), "true".to_string())));
        assert!(params.contains(&("extended".to_string(), "region=west".to_string())));
    }
}

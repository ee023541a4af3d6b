// ABOUTME: Pre-run validation of name-valued filters against source metadata
// ABOUTME: Unknown approval/grade/qualifier/location names fail the run up front

use anyhow::{bail, Result};

use crate::filters::ChangeFilter;
use crate::source::client::SourceClient;
use crate::source::models::NamedId;

fn resolve_names(names: &[String], known: &[NamedId], what: &str) -> Result<Vec<String>> {
    let mut resolved = Vec::with_capacity(names.len());
    for name in names {
        match known
            .iter()
            .find(|item| item.name.eq_ignore_ascii_case(name) || item.id == *name)
        {
            Some(item) => resolved.push(item.id.clone()),
            None => {
                let available: Vec<&str> = known.iter().map(|item| item.name.as_str()).collect();
                bail!(
                    "Unknown {} '{}'. Available: {}",
                    what,
                    name,
                    available.join(", ")
                );
            }
        }
    }
    Ok(resolved)
}

/// Resolve human-readable filter names to canonical identifiers, failing the
/// run immediately on any unknown name. Lookups are only issued for filter
/// kinds that are actually in use.
pub async fn resolve(client: &SourceClient, filter: &ChangeFilter) -> Result<ChangeFilter> {
    let mut resolved = filter.clone();

    if !filter.approvals.is_empty() {
        let known = client.list_approvals().await?;
        resolved.approvals = resolve_names(&filter.approvals, &known, "approval level")?;
    }
    if !filter.grades.is_empty() {
        let known = client.list_grades().await?;
        resolved.grades = resolve_names(&filter.grades, &known, "grade")?;
    }
    if !filter.qualifiers.is_empty() {
        let known = client.list_qualifiers().await?;
        resolved.qualifiers = resolve_names(&filter.qualifiers, &known, "qualifier")?;
    }
    if let Some(ref location_id) = filter.location_id {
        // Existence check; the response itself is cached later by the run's
        // LocationCache, not here.
        client.get_location(location_id).await?;
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<NamedId> {
        vec![
            NamedId {
                id: "1200".to_string(),
                name: "Approved".to_string(),
            },
            NamedId {
                id: "900".to_string(),
                name: "Working".to_string(),
            },
        ]
    }

    #[test]
    fn test_resolve_names_by_name_case_insensitive() {
        let resolved =
            resolve_names(&["approved".to_string()], &known(), "approval level").unwrap();
        assert_eq!(resolved, vec!["1200".to_string()]);
    }

    #[test]
    fn test_resolve_names_accepts_canonical_id() {
        let resolved = resolve_names(&["900".to_string()], &known(), "approval level").unwrap();
        assert_eq!(resolved, vec!["900".to_string()]);
    }

    #[test]
    fn test_resolve_names_unknown_fails_with_listing() {
        let err = resolve_names(&["Bogus".to_string()], &known(), "approval level")
            .unwrap_err()
            .to_string();
        assert!(err.contains("Unknown approval level 'Bogus'"));
        assert!(err.contains("Approved"));
    }
}

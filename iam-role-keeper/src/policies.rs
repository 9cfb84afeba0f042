//! Managed-policy name resolution against the account's available policies

use std::collections::BTreeSet;

use crate::aws::ManagedPolicy;
use crate::error::{ResourceKind, RoleKeeperError, RoleKeeperResult};
use crate::types::PolicyInput;

/// Resolve requested policy names into a deduplicated set.
///
/// Every requested name must be available; one unknown name rejects the whole
/// request, and the error lists the names that would have been accepted.
pub fn resolve_policies(
    requested: &PolicyInput,
    available: &BTreeSet<String>,
) -> RoleKeeperResult<BTreeSet<String>> {
    let names = requested.names();

    let unknown: Vec<&str> = names
        .iter()
        .copied()
        .filter(|name| !available.contains(*name))
        .collect();
    if !unknown.is_empty() {
        return Err(RoleKeeperError::invalid_policy_set(
            format!(
                "each policy must be a managed policy known to the account, unknown: {}",
                unknown.join(", ")
            ),
            available.iter().cloned(),
        ));
    }

    Ok(names.into_iter().map(str::to_string).collect())
}

/// Names of a fetched policy list
pub fn policy_names(policies: &[ManagedPolicy]) -> BTreeSet<String> {
    policies.iter().map(|p| p.name.clone()).collect()
}

/// Look up the ARN of `name` in a fetched policy list.
///
/// The name was valid when it was resolved; not finding it now means the account
/// changed underneath us.
pub fn policy_arn<'a>(policies: &'a [ManagedPolicy], name: &str) -> RoleKeeperResult<&'a str> {
    policies
        .iter()
        .find(|p| p.name == name)
        .map(|p| p.arn.as_str())
        .ok_or_else(|| RoleKeeperError::race(ResourceKind::ManagedPolicy, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn available(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_name_becomes_singleton() {
        let resolved = resolve_policies(&PolicyInput::from("A"), &available(&["A", "B"])).unwrap();
        assert_eq!(resolved, available(&["A"]));
    }

    #[test]
    fn test_duplicates_collapse() {
        let avail = available(&["A", "B", "C"]);
        let with_dupes: PolicyInput = ["A", "A", "B"].into_iter().collect();
        let without: PolicyInput = ["B", "A"].into_iter().collect();
        assert_eq!(
            resolve_policies(&with_dupes, &avail).unwrap(),
            resolve_policies(&without, &avail).unwrap()
        );
    }

    #[test]
    fn test_unknown_name_rejects_whole_request() {
        let requested: PolicyInput = ["A", "NOPE"].into_iter().collect();
        let err = resolve_policies(&requested, &available(&["B", "A"])).unwrap_err();
        match err {
            RoleKeeperError::InvalidPolicySet { reason, available } => {
                assert!(reason.contains("NOPE"));
                assert_eq!(available, vec!["A".to_string(), "B".to_string()]);
            }
            other => panic!("Expected InvalidPolicySet, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_request_resolves_to_empty_set() {
        assert!(resolve_policies(&PolicyInput::default(), &BTreeSet::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_requesting_every_available_policy_is_allowed() {
        let avail = available(&["A", "B"]);
        let requested: PolicyInput = ["A", "B"].into_iter().collect();
        assert_eq!(resolve_policies(&requested, &avail).unwrap(), avail);
    }

    #[test]
    fn test_policy_arn_lookup() {
        let policies = vec![
            ManagedPolicy::new("A", "arn:aws:iam::aws:policy/A"),
            ManagedPolicy::new("B", "arn:aws:iam::aws:policy/B"),
        ];
        assert_eq!(policy_arn(&policies, "B").unwrap(), "arn:aws:iam::aws:policy/B");
        assert!(matches!(
            policy_arn(&policies, "C"),
            Err(RoleKeeperError::ResourceRace {
                kind: ResourceKind::ManagedPolicy,
                ..
            })
        ));
        assert_eq!(policy_names(&policies), available(&["A", "B"]));
    }
}

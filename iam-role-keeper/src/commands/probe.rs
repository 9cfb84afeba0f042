//! Existence probing and adoption of roles that already exist

use std::collections::BTreeSet;

use crate::aws::IamApi;
use crate::error::RoleKeeperResult;
use crate::types::{validate_role_name, Role, RoleSnapshot};

/// Look up a role by name and capture its live configuration.
///
/// A missing role is not an error. Instance-profile bindings are not
/// discovered, so `has_instance_profile` is always false in the snapshot.
pub async fn probe(api: &dyn IamApi, role_name: &str) -> RoleKeeperResult<RoleSnapshot> {
    validate_role_name(role_name)?;

    let remote = match api.get_role(role_name).await {
        Ok(remote) => remote,
        Err(e) if e.is_no_such_entity() => {
            log::debug!("IAM role {role_name} does not exist");
            return Ok(RoleSnapshot::Missing);
        }
        Err(e) => return Err(e.into()),
    };

    let attached_policies: BTreeSet<String> = api
        .list_attached_policies(role_name)
        .await?
        .into_iter()
        .collect();

    log::info!("IAM role {} already exists: {}", role_name, remote.arn);

    Ok(RoleSnapshot::Existing {
        arn: remote.arn,
        description: remote.description.unwrap_or_default(),
        trust_policy_document: remote.trust_policy_document,
        attached_policies,
        has_instance_profile: false,
    })
}

/// Adopt an existing role; `None` when no role has this name
pub async fn adopt(api: &dyn IamApi, role_name: &str) -> RoleKeeperResult<Option<Role>> {
    let snapshot = probe(api, role_name).await?;
    Ok(Role::adopted(role_name, snapshot))
}

/// Re-probe a role and return a fresh adopted value; `None` if it is gone
pub async fn refresh(api: &dyn IamApi, role: &Role) -> RoleKeeperResult<Option<Role>> {
    let refreshed = adopt(api, role.name()).await?;
    if let Some(current) = &refreshed {
        if current.arn() != role.arn() {
            log::warn!(
                "IAM role {} was replaced: {} is now {}",
                role.name(),
                role.arn(),
                current.arn()
            );
        }
    }
    Ok(refreshed)
}

impl super::service::RoleKeeperService {
    pub async fn probe(&self, role_name: &str) -> RoleKeeperResult<RoleSnapshot> {
        probe(self.iam(), role_name).await
    }

    pub async fn adopt(&self, role_name: &str) -> RoleKeeperResult<Option<Role>> {
        adopt(self.iam(), role_name).await
    }

    pub async fn refresh(&self, role: &Role) -> RoleKeeperResult<Option<Role>> {
        refresh(self.iam(), role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::ManagedPolicy;
    use crate::error::RoleKeeperError;
    use crate::testing::{IamCall, InMemoryIam};

    #[tokio::test]
    async fn test_probe_missing_role() {
        let iam = InMemoryIam::new();
        let snapshot = probe(&iam, "missing-role").await.unwrap();
        assert_eq!(snapshot, RoleSnapshot::Missing);
        assert!(!snapshot.exists());
        assert!(snapshot.arn().is_none());
        assert!(snapshot.description().is_none());
        assert!(snapshot.trust_policy_document().is_none());
        assert!(snapshot.attached_policies().is_none());
        assert!(snapshot.has_instance_profile().is_none());
        // Not-found short-circuits before listing policies
        assert_eq!(iam.calls(), vec![IamCall::GetRole("missing-role".into())]);
    }

    #[tokio::test]
    async fn test_probe_existing_role_defaults_description() {
        let iam = InMemoryIam::new()
            .with_policies([ManagedPolicy::new("P1", "arn:aws:iam::aws:policy/P1")])
            .with_existing_role("legacy", None, serde_json::json!({"Version": "2012-10-17"}), ["P1"]);

        let snapshot = probe(&iam, "legacy").await.unwrap();
        assert!(snapshot.exists());
        assert_eq!(snapshot.description(), Some(""));
        assert_eq!(snapshot.has_instance_profile(), Some(false));
        assert_eq!(
            snapshot.attached_policies(),
            Some(&BTreeSet::from(["P1".to_string()]))
        );
    }

    #[tokio::test]
    async fn test_probe_propagates_other_failures() {
        let iam = InMemoryIam::new().failing_on("GetRole");
        let err = probe(&iam, "any-role").await.unwrap_err();
        assert!(matches!(err, RoleKeeperError::Aws(_)));
    }

    #[tokio::test]
    async fn test_probe_rejects_bad_name_without_calls() {
        let iam = InMemoryIam::new();
        let err = probe(&iam, "bad name").await.unwrap_err();
        assert!(matches!(err, RoleKeeperError::InvalidRoleName(_)));
        assert!(iam.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_returns_new_value() {
        let iam = InMemoryIam::new().with_existing_role(
            "legacy",
            Some("old"),
            serde_json::json!({}),
            Vec::<String>::new(),
        );
        let role = adopt(&iam, "legacy").await.unwrap().unwrap();
        iam.delete_role("legacy").await.unwrap();

        assert!(refresh(&iam, &role).await.unwrap().is_none());
        assert_eq!(role.description(), "old");
    }
}

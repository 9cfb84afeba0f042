//! Role teardown and instance-profile lookup

use crate::aws::IamApi;
use crate::error::{ResourceKind, RoleKeeperError, RoleKeeperResult};
use crate::policies::policy_arn;
use crate::types::Role;

/// ARN of the first instance profile bound to the role, if any.
///
/// Always queries IAM, so the answer can disagree with `role.has_instance_profile()`.
pub async fn instance_profile_arn(api: &dyn IamApi, role: &Role) -> RoleKeeperResult<Option<String>> {
    let profiles = api.list_instance_profiles_for_role(role.name()).await?;
    Ok(profiles.into_iter().next().map(|p| p.arn))
}

/// Delete the role and everything provisioning attached to it.
///
/// Steps run in reverse creation order: instance profile, managed policies, role.
/// The first failure aborts the rest and nothing is rolled back; call again once
/// the cause is fixed. `role` itself is not modified.
pub async fn destroy(api: &dyn IamApi, role: &Role) -> RoleKeeperResult<()> {
    let role_name = role.name();

    if role.has_instance_profile() {
        let profile = api
            .list_instance_profiles_for_role(role_name)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RoleKeeperError::race(ResourceKind::InstanceProfile, format!("{role_name} (none bound)"))
            })?;
        api.remove_role_from_instance_profile(&profile.name, role_name)
            .await?;
        api.delete_instance_profile(&profile.name).await?;
        log::info!("Deleted instance profile {}", profile.name);
    }

    if !role.attached_policies().is_empty() {
        let available = api.list_available_policies().await?;
        for policy in role.attached_policies() {
            let arn = policy_arn(&available, policy)?;
            api.detach_policy(role_name, arn).await?;
            log::info!("Detached policy {} from role {}", policy, role_name);
        }
    }

    api.delete_role(role_name).await?;
    log::info!("Deleted role {}", role_name);
    Ok(())
}

impl super::service::RoleKeeperService {
    pub async fn instance_profile_arn(&self, role: &Role) -> RoleKeeperResult<Option<String>> {
        instance_profile_arn(self.iam(), role).await
    }

    pub async fn destroy(&self, role: &Role) -> RoleKeeperResult<()> {
        destroy(self.iam(), role).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::ManagedPolicy;
    use crate::commands::{adopt, provision};
    use crate::testing::{IamCall, InMemoryIam};
    use crate::types::{PolicyInput, RoleSpec};

    fn account() -> InMemoryIam {
        InMemoryIam::new().with_policies([
            ManagedPolicy::new("A", "arn:aws:iam::aws:policy/A"),
            ManagedPolicy::new("B", "arn:aws:iam::aws:policy/B"),
        ])
    }

    #[tokio::test]
    async fn test_instance_profile_arn_reflects_live_state() {
        let iam = account();
        let role = provision(&iam, &RoleSpec::new("web").instance_profile(true))
            .await
            .unwrap();

        let arn = instance_profile_arn(&iam, &role).await.unwrap();
        assert_eq!(
            arn.as_deref(),
            Some("arn:aws:iam::123456789012:instance-profile/web-instance-profile")
        );

        let bare = provision(&iam, &RoleSpec::new("bare")).await.unwrap();
        assert_eq!(instance_profile_arn(&iam, &bare).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_destroy_without_bound_profile_fails_first() {
        let iam = account();
        let role = provision(&iam, &RoleSpec::new("lonely")).await.unwrap();
        let flagged = role.with_instance_profile(true);
        iam.clear_calls();

        let err = destroy(&iam, &flagged).await.unwrap_err();
        assert!(matches!(
            err,
            RoleKeeperError::ResourceRace {
                kind: ResourceKind::InstanceProfile,
                ..
            }
        ));
        assert!(iam.role_exists("lonely"));
        assert_eq!(
            iam.calls(),
            vec![IamCall::ListInstanceProfilesForRole("lonely".into())]
        );
    }

    #[tokio::test]
    async fn test_destroy_aborts_on_first_failure() {
        let iam = account();
        let policies: PolicyInput = ["A", "B"].into_iter().collect();
        let role = provision(&iam, &RoleSpec::new("stuck").policies(policies))
            .await
            .unwrap();
        let iam = iam.failing_on("DetachRolePolicy");

        assert!(destroy(&iam, &role).await.is_err());
        assert!(iam.role_exists("stuck"));
        assert_eq!(iam.attached_policies("stuck").len(), 2);
    }

    #[tokio::test]
    async fn test_destroy_fails_when_attached_policy_vanished() {
        let iam = account();
        let role = provision(&iam, &RoleSpec::new("orphan").policies("A"))
            .await
            .unwrap();
        iam.remove_policy("A");
        iam.clear_calls();

        let err = destroy(&iam, &role).await.unwrap_err();
        match err {
            RoleKeeperError::ResourceRace { kind, name } => {
                assert_eq!(kind, ResourceKind::ManagedPolicy);
                assert_eq!(name, "A");
            }
            other => panic!("Expected ResourceRace, got {other:?}"),
        }
        assert_eq!(iam.calls(), vec![IamCall::ListAvailablePolicies]);
        assert!(iam.role_exists("orphan"));
    }

    #[tokio::test]
    async fn test_destroy_adopted_role_skips_unknown_profile() {
        let iam = account();
        provision(&iam, &RoleSpec::new("shared").instance_profile(true))
            .await
            .unwrap();
        let adopted = adopt(&iam, "shared").await.unwrap().unwrap();
        assert!(!adopted.has_instance_profile());
        assert!(instance_profile_arn(&iam, &adopted).await.unwrap().is_some());

        // The adopted value does not know about the profile; opting in cleans it up
        destroy(&iam, &adopted.with_instance_profile(true)).await.unwrap();
        assert!(!iam.role_exists("shared"));
        assert!(!iam.instance_profile_exists("shared-instance-profile"));
    }
}

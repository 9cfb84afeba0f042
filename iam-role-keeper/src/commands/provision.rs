//! Role creation and the adopt-or-create entry point

use crate::aws::{AwsError, IamApi};
use crate::error::RoleKeeperResult;
use crate::policies::{policy_arn, policy_names, resolve_policies};
use crate::synthesis::build_trust_policy;
use crate::types::{instance_profile_name, validate_role_name, Role, RoleSpec};

use super::probe::probe;

/// Create a role matching `spec`, attach its policies and optionally bind an instance profile.
///
/// Only valid when no role with this name exists. The steps are not idempotent:
/// after a partial failure, re-probe (or call [`ensure_role`]) instead of retrying.
pub async fn provision(api: &dyn IamApi, spec: &RoleSpec) -> RoleKeeperResult<Role> {
    validate_role_name(&spec.name)?;

    let trust_policy = build_trust_policy(spec.service);
    let trust_policy_document = serde_json::to_value(&trust_policy)
        .map_err(|e| AwsError::PolicyError(format!("Failed to serialize policy: {e}")))?;

    let available = api.list_available_policies().await?;
    let resolved = resolve_policies(&spec.policies, &policy_names(&available))?;

    let arn = api
        .create_role(&spec.name, &trust_policy, spec.effective_description())
        .await?;
    log::info!("Created role {} with arn {}", spec.name, arn);

    if !resolved.is_empty() {
        // ARNs come from a fresh listing so a policy deleted since validation is caught
        let current = api.list_available_policies().await?;
        for policy in &resolved {
            let arn = policy_arn(&current, policy)?;
            api.attach_policy(&spec.name, arn).await?;
            log::info!("Attached policy {} to role {}", policy, spec.name);
        }
    }

    if spec.instance_profile {
        let profile_name = instance_profile_name(&spec.name);
        api.create_instance_profile(&profile_name).await?;
        api.add_role_to_instance_profile(&profile_name, &spec.name)
            .await?;
        log::info!("Created instance profile {}", profile_name);
    }

    Ok(Role::provisioned(spec, trust_policy_document, resolved, arn))
}

/// Adopt the role named by `spec` if it exists, otherwise provision it.
///
/// An adopted role keeps its live configuration; the rest of `spec` is ignored.
pub async fn ensure_role(api: &dyn IamApi, spec: &RoleSpec) -> RoleKeeperResult<Role> {
    let snapshot = probe(api, &spec.name).await?;
    match Role::adopted(&spec.name, snapshot) {
        Some(role) => Ok(role),
        None => provision(api, spec).await,
    }
}

impl super::service::RoleKeeperService {
    pub async fn provision(&self, spec: &RoleSpec) -> RoleKeeperResult<Role> {
        provision(self.iam(), spec).await
    }

    pub async fn ensure_role(&self, spec: &RoleSpec) -> RoleKeeperResult<Role> {
        ensure_role(self.iam(), spec).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::ManagedPolicy;
    use crate::error::{ResourceKind, RoleKeeperError};
    use crate::testing::{IamCall, InMemoryIam};
    use crate::types::{PolicyInput, ServicePrincipal};

    fn account() -> InMemoryIam {
        InMemoryIam::new().with_policies([
            ManagedPolicy::new(
                "AmazonS3ReadOnlyAccess",
                "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess",
            ),
            ManagedPolicy::new(
                "AWSBatchFullAccess",
                "arn:aws:iam::aws:policy/AWSBatchFullAccess",
            ),
        ])
    }

    #[tokio::test]
    async fn test_provision_call_order() {
        let iam = account();
        let spec = RoleSpec::new("ordered")
            .service(ServicePrincipal::Ec2)
            .policies("AWSBatchFullAccess")
            .instance_profile(true);

        provision(&iam, &spec).await.unwrap();

        assert_eq!(
            iam.calls(),
            vec![
                IamCall::ListAvailablePolicies,
                IamCall::CreateRole("ordered".into()),
                IamCall::ListAvailablePolicies,
                IamCall::AttachPolicy(
                    "ordered".into(),
                    "arn:aws:iam::aws:policy/AWSBatchFullAccess".into()
                ),
                IamCall::CreateInstanceProfile("ordered-instance-profile".into()),
                IamCall::AddRoleToInstanceProfile(
                    "ordered-instance-profile".into(),
                    "ordered".into()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_provision_unknown_policy_creates_nothing() {
        let iam = account();
        let policies: PolicyInput = ["AmazonS3ReadOnlyAccess", "NOPE"].into_iter().collect();
        let spec = RoleSpec::new("nope").policies(policies);

        let err = provision(&iam, &spec).await.unwrap_err();
        assert!(matches!(err, RoleKeeperError::InvalidPolicySet { .. }));
        assert_eq!(iam.calls(), vec![IamCall::ListAvailablePolicies]);
        assert!(!iam.role_exists("nope"));
    }

    #[tokio::test]
    async fn test_provision_instance_profile_collision_is_fatal() {
        let iam = account().with_instance_profile("clash-instance-profile");
        let spec = RoleSpec::new("clash").instance_profile(true);

        let err = provision(&iam, &spec).await.unwrap_err();
        assert!(matches!(err, RoleKeeperError::Aws(_)));
        // No renaming and no rollback: the role stays behind unbound
        assert!(iam.role_exists("clash"));
        assert!(!iam
            .calls()
            .iter()
            .any(|c| matches!(c, IamCall::AddRoleToInstanceProfile(..))));
    }

    #[tokio::test]
    async fn test_provision_surfaces_vanished_policy_as_race() {
        let iam = account().dropping_policy_after_listing("AmazonS3ReadOnlyAccess");
        let spec = RoleSpec::new("racy").policies("AmazonS3ReadOnlyAccess");

        let err = provision(&iam, &spec).await.unwrap_err();
        assert!(matches!(
            err,
            RoleKeeperError::ResourceRace {
                kind: ResourceKind::ManagedPolicy,
                ref name,
            } if name == "AmazonS3ReadOnlyAccess"
        ));
        assert!(iam.role_exists("racy"));
        assert!(iam.attached_policies("racy").is_empty());
    }

    #[tokio::test]
    async fn test_provision_uses_default_description() {
        let iam = account();
        let role = provision(&iam, &RoleSpec::new("plain")).await.unwrap();
        assert_eq!(role.description(), crate::types::DEFAULT_DESCRIPTION);
        assert_eq!(role.service_principal(), Some(ServicePrincipal::EcsTasks));
        assert_eq!(
            role.trust_policy_document()["Statement"][0]["Principal"]["Service"],
            "ecs-tasks.amazonaws.com"
        );
    }

    #[tokio::test]
    async fn test_ensure_role_adopts_without_creating() {
        let iam = account().with_existing_role(
            "legacy",
            Some("made elsewhere"),
            serde_json::json!({"Version": "2012-10-17", "Statement": []}),
            ["AWSBatchFullAccess"],
        );
        let spec = RoleSpec::new("legacy").service(ServicePrincipal::Lambda);

        let role = ensure_role(&iam, &spec).await.unwrap();
        assert!(role.pre_existing());
        assert_eq!(role.service_principal(), None);
        assert_eq!(role.description(), "made elsewhere");
        assert!(!iam
            .calls()
            .iter()
            .any(|c| matches!(c, IamCall::CreateRole(_))));
    }
}

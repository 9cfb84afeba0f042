//! AWS IAM client wrapper for role lifecycle operations
//!
// TODO: Switch the manual marker loops to the SDK paginators once the crate depends on
// an async stream utility anyway.

use async_trait::async_trait;
use aws_sdk_iam::Client as IamClient;

use crate::aws::api::{IamApi, InstanceProfile, ManagedPolicy, RemoteRole};
use crate::aws::{AwsError, AwsResult};
use crate::types::TrustPolicyDocument;

pub struct AwsIamClient {
    client: IamClient,
}

impl AwsIamClient {
    pub fn new(client: IamClient) -> Self {
        Self { client }
    }

    pub fn from_conf(config: &aws_config::SdkConfig) -> Self {
        Self::new(IamClient::new(config))
    }
}

#[async_trait]
impl IamApi for AwsIamClient {
    async fn get_role(&self, role_name: &str) -> AwsResult<RemoteRole> {
        log::debug!("iam:GetRole {role_name}");
        let response = self
            .client
            .get_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error()
                    .is_some_and(|se| se.is_no_such_entity_exception())
                {
                    AwsError::NoSuchEntity(format!("role '{role_name}'"))
                } else {
                    AwsError::IamError(format!("Failed to get role '{role_name}': {e:?}"))
                }
            })?;

        let role = response.role().ok_or_else(|| {
            AwsError::IamError(format!("GetRole response for '{role_name}' has no role"))
        })?;
        let encoded = role.assume_role_policy_document().ok_or_else(|| {
            AwsError::PolicyError(format!("Role '{role_name}' has no trust policy document"))
        })?;

        Ok(RemoteRole {
            arn: role.arn().to_string(),
            description: role.description().map(str::to_string),
            trust_policy_document: decode_policy_document(encoded)?,
        })
    }

    async fn list_attached_policies(&self, role_name: &str) -> AwsResult<Vec<String>> {
        log::debug!("iam:ListAttachedRolePolicies {role_name}");
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let response = self
                .client
                .list_attached_role_policies()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| {
                    AwsError::IamError(format!(
                        "Failed to list attached policies for role '{role_name}': {e}"
                    ))
                })?;

            names.extend(
                response
                    .attached_policies()
                    .iter()
                    .filter_map(|p| p.policy_name().map(str::to_string)),
            );

            match response.marker() {
                Some(next) if response.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(names)
    }

    async fn list_available_policies(&self) -> AwsResult<Vec<ManagedPolicy>> {
        log::debug!("iam:ListPolicies");
        let mut policies = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let response = self
                .client
                .list_policies()
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| AwsError::IamError(format!("Failed to list policies: {e}")))?;

            policies.extend(response.policies().iter().filter_map(|p| {
                match (p.policy_name(), p.arn()) {
                    (Some(name), Some(arn)) => Some(ManagedPolicy::new(name, arn)),
                    _ => None,
                }
            }));

            match response.marker() {
                Some(next) if response.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(policies)
    }

    async fn create_role(
        &self,
        role_name: &str,
        trust_policy: &TrustPolicyDocument,
        description: &str,
    ) -> AwsResult<String> {
        log::debug!("iam:CreateRole {role_name}");
        let policy_json = serde_json::to_string(trust_policy)
            .map_err(|e| AwsError::PolicyError(format!("Failed to serialize policy: {e}")))?;

        let response = self
            .client
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(policy_json)
            .description(description)
            .send()
            .await
            .map_err(|e| {
                AwsError::IamError(format!("Failed to create role '{role_name}': {e:?}"))
            })?;

        response
            .role()
            .map(|role| role.arn().to_string())
            .ok_or_else(|| {
                AwsError::IamError(format!("CreateRole response for '{role_name}' has no role"))
            })
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> AwsResult<()> {
        log::debug!("iam:AttachRolePolicy {role_name} {policy_arn}");
        self.client
            .attach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| {
                AwsError::IamError(format!(
                    "Failed to attach policy '{policy_arn}' to role '{role_name}': {e}"
                ))
            })?;
        Ok(())
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> AwsResult<()> {
        log::debug!("iam:DetachRolePolicy {role_name} {policy_arn}");
        self.client
            .detach_role_policy()
            .role_name(role_name)
            .policy_arn(policy_arn)
            .send()
            .await
            .map_err(|e| {
                AwsError::IamError(format!(
                    "Failed to detach policy '{policy_arn}' from role '{role_name}': {e}"
                ))
            })?;
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> AwsResult<()> {
        log::debug!("iam:DeleteRole {role_name}");
        self.client
            .delete_role()
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| AwsError::IamError(format!("Failed to delete role '{role_name}': {e}")))?;
        Ok(())
    }

    async fn create_instance_profile(&self, profile_name: &str) -> AwsResult<()> {
        log::debug!("iam:CreateInstanceProfile {profile_name}");
        self.client
            .create_instance_profile()
            .instance_profile_name(profile_name)
            .send()
            .await
            .map_err(|e| {
                AwsError::IamError(format!(
                    "Failed to create instance profile '{profile_name}': {e:?}"
                ))
            })?;
        Ok(())
    }

    async fn delete_instance_profile(&self, profile_name: &str) -> AwsResult<()> {
        log::debug!("iam:DeleteInstanceProfile {profile_name}");
        self.client
            .delete_instance_profile()
            .instance_profile_name(profile_name)
            .send()
            .await
            .map_err(|e| {
                AwsError::IamError(format!(
                    "Failed to delete instance profile '{profile_name}': {e}"
                ))
            })?;
        Ok(())
    }

    async fn add_role_to_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> AwsResult<()> {
        log::debug!("iam:AddRoleToInstanceProfile {profile_name} {role_name}");
        self.client
            .add_role_to_instance_profile()
            .instance_profile_name(profile_name)
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| {
                AwsError::IamError(format!(
                    "Failed to add role '{role_name}' to instance profile '{profile_name}': {e}"
                ))
            })?;
        Ok(())
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> AwsResult<()> {
        log::debug!("iam:RemoveRoleFromInstanceProfile {profile_name} {role_name}");
        self.client
            .remove_role_from_instance_profile()
            .instance_profile_name(profile_name)
            .role_name(role_name)
            .send()
            .await
            .map_err(|e| {
                AwsError::IamError(format!(
                    "Failed to remove role '{role_name}' from instance profile '{profile_name}': {e}"
                ))
            })?;
        Ok(())
    }

    async fn list_instance_profiles_for_role(
        &self,
        role_name: &str,
    ) -> AwsResult<Vec<InstanceProfile>> {
        log::debug!("iam:ListInstanceProfilesForRole {role_name}");
        let mut profiles = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let response = self
                .client
                .list_instance_profiles_for_role()
                .role_name(role_name)
                .set_marker(marker.take())
                .send()
                .await
                .map_err(|e| {
                    AwsError::IamError(format!(
                        "Failed to list instance profiles for role '{role_name}': {e}"
                    ))
                })?;

            profiles.extend(response.instance_profiles().iter().map(|p| InstanceProfile {
                name: p.instance_profile_name().to_string(),
                arn: p.arn().to_string(),
            }));

            match response.marker() {
                Some(next) if response.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(profiles)
    }
}

/// Decode a policy document as returned by IAM (URL-encoded JSON)
pub fn decode_policy_document(encoded: &str) -> AwsResult<serde_json::Value> {
    let decoded = percent_encoding::percent_decode_str(encoded)
        .decode_utf8()
        .map_err(|e| AwsError::PolicyError(format!("Failed to URL decode policy document: {e}")))?;

    serde_json::from_str(&decoded)
        .map_err(|e| AwsError::PolicyError(format!("Failed to parse policy document JSON: {e}")))
}

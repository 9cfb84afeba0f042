//! The IAM operations the role lifecycle consumes.
//!
//! Every lifecycle operation receives an `IamApi` explicitly, so the same code
//! runs against [`AwsIamClient`](super::AwsIamClient) in production and against
//! an in-memory double in tests.

use async_trait::async_trait;
use serde::Serialize;

use super::AwsResult;
use crate::types::TrustPolicyDocument;

/// Live view of a role as returned by `GetRole`
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRole {
    pub arn: String,
    pub description: Option<String>,
    /// Trust policy, already URL-decoded and parsed
    pub trust_policy_document: serde_json::Value,
}

/// A managed policy known to the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedPolicy {
    pub name: String,
    pub arn: String,
}

impl ManagedPolicy {
    pub fn new(name: impl Into<String>, arn: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arn: arn.into(),
        }
    }
}

/// An instance profile bound to a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceProfile {
    pub name: String,
    pub arn: String,
}

#[async_trait]
pub trait IamApi: Send + Sync {
    /// Fetch a role by name. Fails with `AwsError::NoSuchEntity` when absent.
    async fn get_role(&self, role_name: &str) -> AwsResult<RemoteRole>;

    /// Names of the managed policies attached to a role
    async fn list_attached_policies(&self, role_name: &str) -> AwsResult<Vec<String>>;

    /// Every managed policy visible to the account
    async fn list_available_policies(&self) -> AwsResult<Vec<ManagedPolicy>>;

    /// Create a role and return its ARN
    async fn create_role(
        &self,
        role_name: &str,
        trust_policy: &TrustPolicyDocument,
        description: &str,
    ) -> AwsResult<String>;

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> AwsResult<()>;

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> AwsResult<()>;

    async fn delete_role(&self, role_name: &str) -> AwsResult<()>;

    async fn create_instance_profile(&self, profile_name: &str) -> AwsResult<()>;

    async fn delete_instance_profile(&self, profile_name: &str) -> AwsResult<()>;

    async fn add_role_to_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> AwsResult<()>;

    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> AwsResult<()>;

    async fn list_instance_profiles_for_role(
        &self,
        role_name: &str,
    ) -> AwsResult<Vec<InstanceProfile>>;
}

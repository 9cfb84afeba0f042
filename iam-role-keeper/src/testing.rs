//! In-memory IAM collaborator for tests.
//!
//! Keeps roles, managed policies and instance profiles in memory, enforces the IAM
//! conflicts the lifecycle depends on (duplicate names, deleting attached roles),
//! and records every call so tests can assert on ordering.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::aws::{AwsError, AwsResult, IamApi, InstanceProfile, ManagedPolicy, RemoteRole};
use crate::types::TrustPolicyDocument;

pub const ACCOUNT_ID: &str = "123456789012";

/// One recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IamCall {
    GetRole(String),
    ListAttachedPolicies(String),
    ListAvailablePolicies,
    CreateRole(String),
    AttachPolicy(String, String),
    DetachPolicy(String, String),
    DeleteRole(String),
    CreateInstanceProfile(String),
    DeleteInstanceProfile(String),
    AddRoleToInstanceProfile(String, String),
    RemoveRoleFromInstanceProfile(String, String),
    ListInstanceProfilesForRole(String),
}

impl IamCall {
    /// IAM API operation name, as accepted by [`InMemoryIam::failing_on`]
    pub fn operation(&self) -> &'static str {
        match self {
            IamCall::GetRole(_) => "GetRole",
            IamCall::ListAttachedPolicies(_) => "ListAttachedRolePolicies",
            IamCall::ListAvailablePolicies => "ListPolicies",
            IamCall::CreateRole(_) => "CreateRole",
            IamCall::AttachPolicy(..) => "AttachRolePolicy",
            IamCall::DetachPolicy(..) => "DetachRolePolicy",
            IamCall::DeleteRole(_) => "DeleteRole",
            IamCall::CreateInstanceProfile(_) => "CreateInstanceProfile",
            IamCall::DeleteInstanceProfile(_) => "DeleteInstanceProfile",
            IamCall::AddRoleToInstanceProfile(..) => "AddRoleToInstanceProfile",
            IamCall::RemoveRoleFromInstanceProfile(..) => "RemoveRoleFromInstanceProfile",
            IamCall::ListInstanceProfilesForRole(_) => "ListInstanceProfilesForRole",
        }
    }

    /// True for calls that change account state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            IamCall::GetRole(_)
                | IamCall::ListAttachedPolicies(_)
                | IamCall::ListAvailablePolicies
                | IamCall::ListInstanceProfilesForRole(_)
        )
    }
}

#[derive(Debug)]
struct StoredRole {
    arn: String,
    description: Option<String>,
    trust_policy_document: serde_json::Value,
    attached: Vec<ManagedPolicy>,
}

#[derive(Debug)]
struct StoredProfile {
    arn: String,
    roles: Vec<String>,
}

#[derive(Debug, Default)]
struct State {
    policies: Vec<ManagedPolicy>,
    roles: BTreeMap<String, StoredRole>,
    profiles: BTreeMap<String, StoredProfile>,
    calls: Vec<IamCall>,
    failing: BTreeSet<String>,
    drop_after_listing: Option<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryIam {
    state: Mutex<State>,
}

fn role_arn(name: &str) -> String {
    format!("arn:aws:iam::{ACCOUNT_ID}:role/{name}")
}

fn profile_arn(name: &str) -> String {
    format!("arn:aws:iam::{ACCOUNT_ID}:instance-profile/{name}")
}

impl InMemoryIam {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state_mut(&mut self) -> &mut State {
        self.state.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Managed policies available in the account
    pub fn with_policies(mut self, policies: impl IntoIterator<Item = ManagedPolicy>) -> Self {
        self.state_mut().policies.extend(policies);
        self
    }

    /// A role that exists before the code under test runs
    pub fn with_existing_role<I>(
        mut self,
        name: &str,
        description: Option<&str>,
        trust_policy_document: serde_json::Value,
        attached: I,
    ) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let state = self.state_mut();
        let attached = attached
            .into_iter()
            .map(Into::into)
            .map(|name: String| {
                state
                    .policies
                    .iter()
                    .find(|p| p.name == name)
                    .cloned()
                    .unwrap_or_else(|| {
                        let arn = format!("arn:aws:iam::aws:policy/{name}");
                        ManagedPolicy::new(name, arn)
                    })
            })
            .collect();
        state.roles.insert(
            name.to_string(),
            StoredRole {
                arn: role_arn(name),
                description: description.map(str::to_string),
                trust_policy_document,
                attached,
            },
        );
        self
    }

    /// An instance profile, not bound to any role, that already exists
    pub fn with_instance_profile(mut self, name: &str) -> Self {
        self.state_mut().profiles.insert(
            name.to_string(),
            StoredProfile {
                arn: profile_arn(name),
                roles: Vec::new(),
            },
        );
        self
    }

    /// Fail every call to the named IAM operation with a service error
    pub fn failing_on(mut self, operation: &str) -> Self {
        self.state_mut().failing.insert(operation.to_string());
        self
    }

    /// Delete `policy` from the account right after the next policy listing
    pub fn dropping_policy_after_listing(mut self, policy: &str) -> Self {
        self.state_mut().drop_after_listing = Some(policy.to_string());
        self
    }

    /// Delete a managed policy from the account now, leaving attachments recorded
    /// on existing roles in place
    pub fn remove_policy(&self, policy: &str) {
        self.state().policies.retain(|p| p.name != policy);
    }

    pub fn calls(&self) -> Vec<IamCall> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn role_exists(&self, name: &str) -> bool {
        self.state().roles.contains_key(name)
    }

    pub fn instance_profile_exists(&self, name: &str) -> bool {
        self.state().profiles.contains_key(name)
    }

    /// Names of the policies attached to a role; empty for unknown roles
    pub fn attached_policies(&self, role_name: &str) -> BTreeSet<String> {
        self.state()
            .roles
            .get(role_name)
            .map(|r| r.attached.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }

    /// Record the call and apply failure injection
    fn enter(&self, call: IamCall) -> AwsResult<MutexGuard<'_, State>> {
        let mut state = self.state();
        let operation = call.operation();
        state.calls.push(call);
        if state.failing.contains(operation) {
            return Err(AwsError::IamError(format!(
                "{operation} failed: ServiceFailure (injected)"
            )));
        }
        Ok(state)
    }
}

fn no_such_entity(what: String) -> AwsError {
    AwsError::NoSuchEntity(what)
}

fn conflict(operation: &str, detail: String) -> AwsError {
    AwsError::IamError(format!("{operation} failed: {detail}"))
}

#[async_trait]
impl IamApi for InMemoryIam {
    async fn get_role(&self, role_name: &str) -> AwsResult<RemoteRole> {
        let state = self.enter(IamCall::GetRole(role_name.to_string()))?;
        let role = state
            .roles
            .get(role_name)
            .ok_or_else(|| no_such_entity(format!("role '{role_name}'")))?;
        Ok(RemoteRole {
            arn: role.arn.clone(),
            description: role.description.clone(),
            trust_policy_document: role.trust_policy_document.clone(),
        })
    }

    async fn list_attached_policies(&self, role_name: &str) -> AwsResult<Vec<String>> {
        let state = self.enter(IamCall::ListAttachedPolicies(role_name.to_string()))?;
        let role = state
            .roles
            .get(role_name)
            .ok_or_else(|| no_such_entity(format!("role '{role_name}'")))?;
        Ok(role.attached.iter().map(|p| p.name.clone()).collect())
    }

    async fn list_available_policies(&self) -> AwsResult<Vec<ManagedPolicy>> {
        let mut state = self.enter(IamCall::ListAvailablePolicies)?;
        let listed = state.policies.clone();
        if let Some(dropped) = state.drop_after_listing.take() {
            state.policies.retain(|p| p.name != dropped);
        }
        Ok(listed)
    }

    async fn create_role(
        &self,
        role_name: &str,
        trust_policy: &TrustPolicyDocument,
        description: &str,
    ) -> AwsResult<String> {
        let mut state = self.enter(IamCall::CreateRole(role_name.to_string()))?;
        if state.roles.contains_key(role_name) {
            return Err(conflict(
                "CreateRole",
                format!("EntityAlreadyExists: role '{role_name}'"),
            ));
        }
        let trust_policy_document = serde_json::to_value(trust_policy)
            .map_err(|e| AwsError::PolicyError(format!("Failed to serialize policy: {e}")))?;
        let arn = role_arn(role_name);
        state.roles.insert(
            role_name.to_string(),
            StoredRole {
                arn: arn.clone(),
                description: Some(description.to_string()),
                trust_policy_document,
                attached: Vec::new(),
            },
        );
        Ok(arn)
    }

    async fn attach_policy(&self, role_name: &str, policy_arn: &str) -> AwsResult<()> {
        let mut state = self.enter(IamCall::AttachPolicy(
            role_name.to_string(),
            policy_arn.to_string(),
        ))?;
        let policy = state
            .policies
            .iter()
            .find(|p| p.arn == policy_arn)
            .cloned()
            .ok_or_else(|| no_such_entity(format!("policy '{policy_arn}'")))?;
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| no_such_entity(format!("role '{role_name}'")))?;
        if !role.attached.contains(&policy) {
            role.attached.push(policy);
        }
        Ok(())
    }

    async fn detach_policy(&self, role_name: &str, policy_arn: &str) -> AwsResult<()> {
        let mut state = self.enter(IamCall::DetachPolicy(
            role_name.to_string(),
            policy_arn.to_string(),
        ))?;
        let role = state
            .roles
            .get_mut(role_name)
            .ok_or_else(|| no_such_entity(format!("role '{role_name}'")))?;
        let before = role.attached.len();
        role.attached.retain(|p| p.arn != policy_arn);
        if role.attached.len() == before {
            return Err(no_such_entity(format!(
                "policy '{policy_arn}' attached to role '{role_name}'"
            )));
        }
        Ok(())
    }

    async fn delete_role(&self, role_name: &str) -> AwsResult<()> {
        let mut state = self.enter(IamCall::DeleteRole(role_name.to_string()))?;
        let role = state
            .roles
            .get(role_name)
            .ok_or_else(|| no_such_entity(format!("role '{role_name}'")))?;
        if !role.attached.is_empty() {
            return Err(conflict(
                "DeleteRole",
                format!("DeleteConflict: role '{role_name}' still has attached policies"),
            ));
        }
        if state
            .profiles
            .values()
            .any(|p| p.roles.iter().any(|r| r == role_name))
        {
            return Err(conflict(
                "DeleteRole",
                format!("DeleteConflict: role '{role_name}' is still in an instance profile"),
            ));
        }
        state.roles.remove(role_name);
        Ok(())
    }

    async fn create_instance_profile(&self, profile_name: &str) -> AwsResult<()> {
        let mut state = self.enter(IamCall::CreateInstanceProfile(profile_name.to_string()))?;
        if state.profiles.contains_key(profile_name) {
            return Err(conflict(
                "CreateInstanceProfile",
                format!("EntityAlreadyExists: instance profile '{profile_name}'"),
            ));
        }
        state.profiles.insert(
            profile_name.to_string(),
            StoredProfile {
                arn: profile_arn(profile_name),
                roles: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_instance_profile(&self, profile_name: &str) -> AwsResult<()> {
        let mut state = self.enter(IamCall::DeleteInstanceProfile(profile_name.to_string()))?;
        let profile = state
            .profiles
            .get(profile_name)
            .ok_or_else(|| no_such_entity(format!("instance profile '{profile_name}'")))?;
        if !profile.roles.is_empty() {
            return Err(conflict(
                "DeleteInstanceProfile",
                format!("DeleteConflict: instance profile '{profile_name}' still has a role"),
            ));
        }
        state.profiles.remove(profile_name);
        Ok(())
    }

    async fn add_role_to_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> AwsResult<()> {
        let mut state = self.enter(IamCall::AddRoleToInstanceProfile(
            profile_name.to_string(),
            role_name.to_string(),
        ))?;
        if !state.roles.contains_key(role_name) {
            return Err(no_such_entity(format!("role '{role_name}'")));
        }
        let profile = state
            .profiles
            .get_mut(profile_name)
            .ok_or_else(|| no_such_entity(format!("instance profile '{profile_name}'")))?;
        if !profile.roles.is_empty() {
            return Err(conflict(
                "AddRoleToInstanceProfile",
                format!("LimitExceeded: instance profile '{profile_name}' already has a role"),
            ));
        }
        profile.roles.push(role_name.to_string());
        Ok(())
    }

    async fn remove_role_from_instance_profile(
        &self,
        profile_name: &str,
        role_name: &str,
    ) -> AwsResult<()> {
        let mut state = self.enter(IamCall::RemoveRoleFromInstanceProfile(
            profile_name.to_string(),
            role_name.to_string(),
        ))?;
        let profile = state
            .profiles
            .get_mut(profile_name)
            .ok_or_else(|| no_such_entity(format!("instance profile '{profile_name}'")))?;
        let before = profile.roles.len();
        profile.roles.retain(|r| r != role_name);
        if profile.roles.len() == before {
            return Err(no_such_entity(format!(
                "role '{role_name}' in instance profile '{profile_name}'"
            )));
        }
        Ok(())
    }

    async fn list_instance_profiles_for_role(
        &self,
        role_name: &str,
    ) -> AwsResult<Vec<InstanceProfile>> {
        let state = self.enter(IamCall::ListInstanceProfilesForRole(role_name.to_string()))?;
        if !state.roles.contains_key(role_name) {
            return Err(no_such_entity(format!("role '{role_name}'")));
        }
        Ok(state
            .profiles
            .iter()
            .filter(|(_, p)| p.roles.iter().any(|r| r == role_name))
            .map(|(name, p)| InstanceProfile {
                name: name.clone(),
                arn: p.arn.clone(),
            })
            .collect())
    }
}

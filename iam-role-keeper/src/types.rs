//! Value types shared by the role lifecycle operations

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::{RoleKeeperError, RoleKeeperResult};

pub const POLICY_VERSION: &str = "2012-10-17";
pub const DEFAULT_DESCRIPTION: &str = "This role was generated by iam-role-keeper";
pub const INSTANCE_PROFILE_SUFFIX: &str = "-instance-profile";

const MAX_ROLE_NAME_LEN: usize = 64;

/// AWS services a role can be built to trust
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ServicePrincipal {
    #[serde(rename = "batch")]
    Batch,
    #[serde(rename = "ec2")]
    Ec2,
    #[default]
    #[serde(rename = "ecs-tasks")]
    EcsTasks,
    #[serde(rename = "lambda")]
    Lambda,
    #[serde(rename = "spotfleet")]
    SpotFleet,
}

impl ServicePrincipal {
    pub const ALL: [ServicePrincipal; 5] = [
        ServicePrincipal::Batch,
        ServicePrincipal::Ec2,
        ServicePrincipal::EcsTasks,
        ServicePrincipal::Lambda,
        ServicePrincipal::SpotFleet,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServicePrincipal::Batch => "batch",
            ServicePrincipal::Ec2 => "ec2",
            ServicePrincipal::EcsTasks => "ecs-tasks",
            ServicePrincipal::Lambda => "lambda",
            ServicePrincipal::SpotFleet => "spotfleet",
        }
    }

    /// Principal as it appears in a trust policy, e.g. `lambda.amazonaws.com`
    pub fn service_host(&self) -> String {
        format!("{}.amazonaws.com", self.as_str())
    }
}

impl fmt::Display for ServicePrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServicePrincipal {
    type Err = RoleKeeperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServicePrincipal::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| RoleKeeperError::InvalidServicePrincipal {
                requested: s.to_string(),
            })
    }
}

/// Managed policies requested for a new role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PolicyInput {
    SingleName(String),
    NameSet(Vec<String>),
}

impl PolicyInput {
    pub fn names(&self) -> BTreeSet<&str> {
        match self {
            PolicyInput::SingleName(name) => BTreeSet::from([name.as_str()]),
            PolicyInput::NameSet(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl Default for PolicyInput {
    fn default() -> Self {
        PolicyInput::NameSet(Vec::new())
    }
}

impl From<&str> for PolicyInput {
    fn from(name: &str) -> Self {
        PolicyInput::SingleName(name.to_string())
    }
}

impl From<String> for PolicyInput {
    fn from(name: String) -> Self {
        PolicyInput::SingleName(name)
    }
}

impl<S: Into<String>> FromIterator<S> for PolicyInput {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        PolicyInput::NameSet(iter.into_iter().map(Into::into).collect())
    }
}

/// Trust policy allowing a single service principal to assume a role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPolicyDocument {
    pub version: String,
    pub statement: Vec<TrustStatement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustStatement {
    pub sid: String,
    pub effect: String,
    pub principal: TrustPrincipal,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrustPrincipal {
    pub service: String,
}

/// Desired configuration for a role that may have to be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    pub name: String,
    pub description: Option<String>,
    pub service: ServicePrincipal,
    pub policies: PolicyInput,
    pub instance_profile: bool,
}

impl RoleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            service: ServicePrincipal::default(),
            policies: PolicyInput::default(),
            instance_profile: false,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn service(mut self, service: ServicePrincipal) -> Self {
        self.service = service;
        self
    }

    pub fn policies(mut self, policies: impl Into<PolicyInput>) -> Self {
        self.policies = policies.into();
        self
    }

    pub fn instance_profile(mut self, instance_profile: bool) -> Self {
        self.instance_profile = instance_profile;
        self
    }

    /// Description sent to IAM; empty or missing falls back to the default
    pub fn effective_description(&self) -> &str {
        match self.description.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => DEFAULT_DESCRIPTION,
        }
    }

    /// Parse a role spec from a JSON document.
    ///
    /// Keys: `name` (required), `description`, `service`, `policies` (string or
    /// array of strings), `instance_profile` (boolean). Shape errors are reported
    /// with the same error kinds as invalid typed input.
    pub fn from_json_str(json: &str) -> RoleKeeperResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| RoleKeeperError::Spec(format!("not valid JSON: {e}")))?;
        Self::from_json_value(&value)
    }

    pub fn from_json_value(value: &serde_json::Value) -> RoleKeeperResult<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| RoleKeeperError::Spec("expected a JSON object".to_string()))?;

        let name = object
            .get("name")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| RoleKeeperError::Spec("missing string field 'name'".to_string()))?;
        let mut spec = RoleSpec::new(name);

        match object.get("description") {
            None | Some(serde_json::Value::Null) => {}
            Some(serde_json::Value::String(d)) => spec.description = Some(d.clone()),
            Some(other) => {
                return Err(RoleKeeperError::Spec(format!(
                    "'description' must be a string, got {other}"
                )))
            }
        }

        if let Some(service) = object.get("service") {
            spec.service = match service.as_str() {
                Some(s) => s.parse()?,
                None => {
                    return Err(RoleKeeperError::InvalidServicePrincipal {
                        requested: service.to_string(),
                    })
                }
            };
        }

        if let Some(policies) = object.get("policies") {
            spec.policies = PolicyInput::deserialize(policies).map_err(|_| {
                RoleKeeperError::invalid_policy_set(
                    format!("policies must be a string or a sequence of strings, got {policies}"),
                    Vec::<String>::new(),
                )
            })?;
        }

        if let Some(flag) = object.get("instance_profile") {
            spec.instance_profile = flag
                .as_bool()
                .ok_or_else(|| RoleKeeperError::InvalidInstanceProfileFlag(flag.to_string()))?;
        }

        Ok(spec)
    }
}

/// Check a role name locally before it is sent to IAM
pub fn validate_role_name(name: &str) -> RoleKeeperResult<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_ROLE_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+=,.@_-".contains(c));
    if valid {
        Ok(())
    } else {
        Err(RoleKeeperError::InvalidRoleName(name.to_string()))
    }
}

/// Name of the instance profile created alongside a role
pub fn instance_profile_name(role_name: &str) -> String {
    format!("{role_name}{INSTANCE_PROFILE_SUFFIX}")
}

/// Result of probing IAM for a role by name
#[derive(Debug, Clone, PartialEq)]
pub enum RoleSnapshot {
    Missing,
    Existing {
        arn: String,
        description: String,
        trust_policy_document: serde_json::Value,
        attached_policies: BTreeSet<String>,
        /// Always false: probing does not look for instance-profile bindings
        has_instance_profile: bool,
    },
}

impl RoleSnapshot {
    pub fn exists(&self) -> bool {
        matches!(self, RoleSnapshot::Existing { .. })
    }

    pub fn arn(&self) -> Option<&str> {
        match self {
            RoleSnapshot::Existing { arn, .. } => Some(arn),
            RoleSnapshot::Missing => None,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            RoleSnapshot::Existing { description, .. } => Some(description),
            RoleSnapshot::Missing => None,
        }
    }

    pub fn trust_policy_document(&self) -> Option<&serde_json::Value> {
        match self {
            RoleSnapshot::Existing {
                trust_policy_document,
                ..
            } => Some(trust_policy_document),
            RoleSnapshot::Missing => None,
        }
    }

    pub fn attached_policies(&self) -> Option<&BTreeSet<String>> {
        match self {
            RoleSnapshot::Existing {
                attached_policies, ..
            } => Some(attached_policies),
            RoleSnapshot::Missing => None,
        }
    }

    pub fn has_instance_profile(&self) -> Option<bool> {
        match self {
            RoleSnapshot::Existing {
                has_instance_profile,
                ..
            } => Some(*has_instance_profile),
            RoleSnapshot::Missing => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SnapshotView<'a> {
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    arn: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trust_policy_document: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attached_policies: Option<&'a BTreeSet<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    has_instance_profile: Option<bool>,
}

impl Serialize for RoleSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SnapshotView {
            exists: self.exists(),
            arn: self.arn(),
            description: self.description(),
            trust_policy_document: self.trust_policy_document(),
            attached_policies: self.attached_policies(),
            has_instance_profile: self.has_instance_profile(),
        }
        .serialize(serializer)
    }
}

/// A role that exists in IAM, either adopted or provisioned.
///
/// Configuration is fixed once the value is built; operations that observe
/// newer state return a new `Role`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Role {
    name: String,
    pre_existing: bool,
    description: String,
    service_principal: Option<ServicePrincipal>,
    trust_policy_document: serde_json::Value,
    attached_policies: BTreeSet<String>,
    has_instance_profile: bool,
    arn: String,
}

impl Role {
    /// Build an adopted role from an `Existing` snapshot; `None` for `Missing`
    pub fn adopted(name: impl Into<String>, snapshot: RoleSnapshot) -> Option<Self> {
        match snapshot {
            RoleSnapshot::Missing => None,
            RoleSnapshot::Existing {
                arn,
                description,
                trust_policy_document,
                attached_policies,
                has_instance_profile,
            } => Some(Self {
                name: name.into(),
                pre_existing: true,
                description,
                service_principal: None,
                trust_policy_document,
                attached_policies,
                has_instance_profile,
                arn,
            }),
        }
    }

    pub(crate) fn provisioned(
        spec: &RoleSpec,
        trust_policy_document: serde_json::Value,
        attached_policies: BTreeSet<String>,
        arn: String,
    ) -> Self {
        Self {
            name: spec.name.clone(),
            pre_existing: false,
            description: spec.effective_description().to_string(),
            service_principal: Some(spec.service),
            trust_policy_document,
            attached_policies,
            has_instance_profile: spec.instance_profile,
            arn,
        }
    }

    /// Copy of this role with the instance-profile binding flag overridden.
    ///
    /// Adopted roles always start with the flag off; callers that know a profile
    /// is bound (see `instance_profile_arn`) opt in here before teardown.
    #[must_use]
    pub fn with_instance_profile(&self, has_instance_profile: bool) -> Self {
        Self {
            has_instance_profile,
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pre_existing(&self) -> bool {
        self.pre_existing
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn service_principal(&self) -> Option<ServicePrincipal> {
        self.service_principal
    }

    pub fn trust_policy_document(&self) -> &serde_json::Value {
        &self.trust_policy_document
    }

    pub fn attached_policies(&self) -> &BTreeSet<String> {
        &self.attached_policies
    }

    pub fn has_instance_profile(&self) -> bool {
        self.has_instance_profile
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }
}

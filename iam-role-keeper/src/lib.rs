//! This crate provides the core business logic for IAM Role Keeper:
//! - Existence probing and adoption of roles that already exist
//! - Managed-policy resolution against the account
//! - Role provisioning with trust policy, managed policies and an optional instance profile
//! - Symmetric teardown
//!
//! Every operation takes the IAM collaborator ([`IamApi`]) explicitly; the
//! [`RoleKeeperService`] wires in the AWS SDK client for adapters.

pub mod aws;
pub mod commands;
mod error;
mod policies;
mod synthesis;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
mod types;

// Re-exports for a small, focused public API
pub use aws::{AwsError, AwsIamClient, IamApi, InstanceProfile, ManagedPolicy, RemoteRole};
pub use commands::{
    adopt, destroy, ensure_role, instance_profile_arn, probe, provision, refresh,
    RoleKeeperService,
};
pub use error::{ResourceKind, RoleKeeperError, RoleKeeperResult};
pub use policies::{policy_arn, policy_names, resolve_policies};
pub use synthesis::build_trust_policy;
pub use types::{
    instance_profile_name, validate_role_name, PolicyInput, Role, RoleSnapshot, RoleSpec,
    ServicePrincipal, TrustPolicyDocument, TrustPrincipal, TrustStatement, DEFAULT_DESCRIPTION,
    INSTANCE_PROFILE_SUFFIX, POLICY_VERSION,
};

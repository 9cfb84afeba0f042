//! Error types for role lifecycle operations.

use std::fmt;

use thiserror::Error;

use crate::aws::AwsError;

/// External resources whose disappearance between a read and its use is reported as a race
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    ManagedPolicy,
    InstanceProfile,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::ManagedPolicy => f.write_str("managed policy"),
            ResourceKind::InstanceProfile => f.write_str("instance profile"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RoleKeeperError {
    /// The requested service principal is not one roles can be built for.
    #[error("Invalid service principal '{requested}': must be one of batch, ec2, ecs-tasks, lambda, spotfleet")]
    InvalidServicePrincipal { requested: String },

    /// Policies were malformed or named something the account does not know.
    #[error("Invalid policy set: {reason}. Available managed policies: {available:?}")]
    InvalidPolicySet {
        reason: String,
        available: Vec<String>,
    },

    #[error("Invalid instance profile flag: expected a boolean, got {0}")]
    InvalidInstanceProfileFlag(String),

    #[error("Invalid role name '{0}': must be 1-64 characters from [A-Za-z0-9+=,.@_-]")]
    InvalidRoleName(String),

    /// A resource seen by an earlier read was gone when it was used.
    #[error("{kind} '{name}' disappeared while the role was being modified")]
    ResourceRace { kind: ResourceKind, name: String },

    #[error("Invalid role spec: {0}")]
    Spec(String),

    #[error(transparent)]
    Aws(#[from] AwsError),
}

impl RoleKeeperError {
    pub(crate) fn invalid_policy_set<I>(reason: impl Into<String>, available: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let mut available: Vec<String> = available.into_iter().map(Into::into).collect();
        available.sort();
        available.dedup();
        Self::InvalidPolicySet {
            reason: reason.into(),
            available,
        }
    }

    pub(crate) fn race(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::ResourceRace {
            kind,
            name: name.into(),
        }
    }
}

pub type RoleKeeperResult<T> = Result<T, RoleKeeperError>;

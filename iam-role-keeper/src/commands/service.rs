//! IAM Role Keeper Service Layer
//!
//! This module provides the main service interface that owns the IAM collaborator and
//! exposes the role lifecycle operations (probe, adopt, provision, ensure, destroy) to
//! adapters such as the CLI.

use crate::aws::{AwsIamClient, IamApi};
use crate::error::RoleKeeperResult;

/// Main service struct that holds the IAM collaborator and provides lifecycle operations
pub struct RoleKeeperService {
    iam: Box<dyn IamApi>,
}

impl RoleKeeperService {
    /// Create a new service instance backed by the AWS SDK
    ///
    /// The configuration is loaded using the default credential provider chain.
    ///
    /// # Errors
    ///
    /// Returns an error if AWS SDK configuration fails to load.
    pub async fn new() -> RoleKeeperResult<Self> {
        // Load AWS configuration using the standard credential provider chain.
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        Ok(Self::from_sdk_config(&config))
    }

    /// Create a service from an already loaded SDK configuration
    pub fn from_sdk_config(config: &aws_config::SdkConfig) -> Self {
        Self::with_client(AwsIamClient::from_conf(config))
    }

    /// Create a service around any IAM collaborator, e.g. a test double
    pub fn with_client(iam: impl IamApi + 'static) -> Self {
        Self { iam: Box::new(iam) }
    }

    pub(crate) fn iam(&self) -> &dyn IamApi {
        self.iam.as_ref()
    }

    // probe(), adopt() and refresh() are implemented in probe.rs
    // provision() and ensure_role() are implemented in provision.rs
    // instance_profile_arn() and destroy() are implemented in teardown.rs
}

//! AWS integration: the IAM collaborator contract and its SDK-backed client.

pub mod api;
pub mod iam_client;

use thiserror::Error;

pub use api::{IamApi, InstanceProfile, ManagedPolicy, RemoteRole};
pub use iam_client::AwsIamClient;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("AWS configuration error: {0}")]
    ConfigError(String),
    #[error("No such IAM entity: {0}")]
    NoSuchEntity(String),
    #[error("IAM client error: {0}")]
    IamError(String),
    #[error("Policy document error: {0}")]
    PolicyError(String),
}

impl AwsError {
    /// True for the "no such entity" condition reported by `GetRole`.
    pub fn is_no_such_entity(&self) -> bool {
        matches!(self, AwsError::NoSuchEntity(_))
    }
}

pub type AwsResult<T> = Result<T, AwsError>;

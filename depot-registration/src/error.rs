//! Error types for depot-registration.

use thiserror::Error;

use depot_core::StoreError;

/// Failures reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("consumer {0} does not exist")]
    NotFound(String),

    #[error("consumer {0} has already been removed")]
    Gone(String),

    #[error("identity provider request failed: {0}")]
    Failed(String),
}

impl ProviderError {
    /// The consumer no longer exists on the provider side.
    pub fn is_already_gone(&self) -> bool {
        matches!(self, ProviderError::NotFound(_) | ProviderError::Gone(_))
    }
}

/// All errors that can arise from registering or unregistering a host.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(
        "Host with name {host_name} is currently registered to a different org, please migrate host to {org_name}."
    )]
    WrongOrganization { host_name: String, org_name: String },

    #[error(
        "Host with name {host_name} is currently registered but not in build mode (re_register_build_only is enabled). Unregister the host manually or put it into build mode to continue."
    )]
    NotInBuildMode { host_name: String },

    #[error("This host is reporting a DMI UUID that differs from the existing registration.")]
    DmiUuidChanged,

    #[error("The DMI UUID of this host ({uuid}) matches other registered hosts: {existing}")]
    DmiUuidCollision { uuid: String, existing: String },

    #[error("Host collection '{name}' exceeds maximum usage limit of '{limit}'")]
    HostCollectionFull { name: String, limit: i64 },

    #[error("Content View and Environment not set for registration.")]
    MissingContentViewEnvironment,

    #[error(
        "At least one activation key must have a lifecycle environment and content view assigned to it"
    )]
    NoActivationKeyEnvironment,

    #[error("Unable to determine the organization for registration.")]
    UnknownOrganization,

    #[error("Unable to determine a hostname from the reported facts.")]
    MissingHostname,

    /// The identity provider rejected or failed a request.
    #[error("identity provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("malformed consumer attributes: {0}")]
    Attributes(#[from] serde_json::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

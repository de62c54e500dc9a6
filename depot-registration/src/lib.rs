//! # depot-registration
//!
//! Host identity reconciliation: deriving a registering host's identity,
//! detecting conflicts with existing hosts, and the compensating registration
//! and unregistration sequences that span the local store and the external
//! identity provider.

pub mod conflict;
pub mod error;
pub mod identity;
pub mod manager;
pub mod provider;
pub mod saga;
pub mod unregister;

pub use error::{ProviderError, RegistrationError};
pub use identity::DmiUuid;
pub use manager::RegistrationManager;
pub use provider::{
    ConsumerAttributes, ConsumerParams, FactsHostNaming, HostNaming, IdentityProvider,
};
pub use saga::Saga;
pub use unregister::{remove_host_artifacts, unregister_host, UnregisterMode};

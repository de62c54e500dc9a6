//! Depot core library: domain types, local store persistence, settings, errors.
//!
//! Public API surface:
//! - [`types`]: id newtypes and domain structs (repositories, proxies, hosts, facets)
//! - [`error`]: [`StoreError`]
//! - [`store`]: [`LocalStore`] plus atomic load / save
//! - [`settings`]: [`Settings`] consumed by the planners and the registration manager

pub mod error;
pub mod settings;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use settings::Settings;
pub use store::LocalStore;
pub use types::{
    ActivationKey, ActivationKeyId, ContentFacet, ContentType, ContentUnit, ContentUnitId,
    ContentUnitKind, ContentView, ContentViewEnvironment, ContentViewId, DownloadPolicy,
    EnvironmentId, ErrataStatus, Erratum, ErratumId, GlobalStatus, Host, HostCollection,
    HostCollectionId, HostId, HostStatusKind, LifecycleEnvironment, Organization,
    OrganizationId, Proxy, ProxyId, Repository, RepositoryId, SubscriptionFacet,
    SubscriptionStatus, SyncHistoryEntry,
};

//! Domain types for the Depot content platform.
//!
//! Every persisted entity is keyed by a typed id newtype; relationships are
//! expressed as ids, never as embedded copies. All types round-trip through
//! serde + serde_yaml as part of the [`LocalStore`](crate::store::LocalStore)
//! document.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

id_type!(
    /// Identity of an [`Organization`].
    OrganizationId
);
id_type!(
    /// Identity of a [`LifecycleEnvironment`].
    EnvironmentId
);
id_type!(
    /// Identity of a [`ContentView`].
    ContentViewId
);
id_type!(
    /// Identity of a [`Repository`].
    RepositoryId
);
id_type!(
    /// Identity of a [`ContentUnit`].
    ContentUnitId
);
id_type!(
    /// Identity of an [`Erratum`].
    ErratumId
);
id_type!(
    /// Identity of a capsule [`Proxy`].
    ProxyId
);
id_type!(
    /// Identity of a [`Host`]. Facets are keyed by the owning host's id.
    HostId
);
id_type!(
    /// Identity of an [`ActivationKey`].
    ActivationKeyId
);
id_type!(
    /// Identity of a [`HostCollection`].
    HostCollectionId
);

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Content-type tag of a repository. Selects the sync capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    #[default]
    Yum,
    Deb,
    File,
    Docker,
    AnsibleCollection,
    Python,
    Ostree,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContentType::Yum => "yum",
            ContentType::Deb => "deb",
            ContentType::File => "file",
            ContentType::Docker => "docker",
            ContentType::AnsibleCollection => "ansible_collection",
            ContentType::Python => "python",
            ContentType::Ostree => "ostree",
        };
        f.write_str(label)
    }
}

/// How a proxy fetches repository content from upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPolicy {
    #[default]
    Immediate,
    OnDemand,
    Streamed,
}

/// Concrete kind of a content unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentUnitKind {
    Rpm,
    Srpm,
    Erratum,
    PackageGroup,
    ModuleStream,
    Deb,
    File,
    DockerManifest,
    DockerTag,
    /// Unit of a generic repository; the payload is the unit's own type name.
    Generic(String),
}

impl ContentUnitKind {
    /// Name the backend uses for this unit type.
    pub fn type_name(&self) -> &str {
        match self {
            ContentUnitKind::Rpm => "rpm",
            ContentUnitKind::Srpm => "srpm",
            ContentUnitKind::Erratum => "erratum",
            ContentUnitKind::PackageGroup => "package_group",
            ContentUnitKind::ModuleStream => "modulemd",
            ContentUnitKind::Deb => "deb",
            ContentUnitKind::File => "file",
            ContentUnitKind::DockerManifest => "docker_manifest",
            ContentUnitKind::DockerTag => "docker_tag",
            ContentUnitKind::Generic(name) => name.as_str(),
        }
    }
}

/// Subscription status recorded on a registered host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Unknown,
    Valid,
    Partial,
    Invalid,
    Disabled,
}

impl SubscriptionStatus {
    /// Parse the identity provider's entitlement status label.
    pub fn from_entitlement(label: Option<&str>) -> Self {
        match label {
            Some("valid") => SubscriptionStatus::Valid,
            Some("partial") => SubscriptionStatus::Partial,
            Some("invalid") => SubscriptionStatus::Invalid,
            Some("disabled") => SubscriptionStatus::Disabled,
            _ => SubscriptionStatus::Unknown,
        }
    }

    pub fn to_global(self) -> GlobalStatus {
        match self {
            SubscriptionStatus::Valid | SubscriptionStatus::Disabled => GlobalStatus::Ok,
            SubscriptionStatus::Unknown | SubscriptionStatus::Partial => GlobalStatus::Warning,
            SubscriptionStatus::Invalid => GlobalStatus::Error,
        }
    }
}

/// Errata applicability status of a content facet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrataStatus {
    #[default]
    Unknown,
    UpToDate,
    Needed,
    SecurityNeeded,
}

impl ErrataStatus {
    pub fn to_global(self) -> GlobalStatus {
        match self {
            ErrataStatus::UpToDate => GlobalStatus::Ok,
            ErrataStatus::Unknown | ErrataStatus::Needed => GlobalStatus::Warning,
            ErrataStatus::SecurityNeeded => GlobalStatus::Error,
        }
    }
}

/// Aggregate health of a host. Ordered so that `max` yields the worst status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GlobalStatus {
    #[default]
    Ok,
    Warning,
    Error,
}

/// Per-host status slots. Stripping host artifacts destroys all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostStatusKind {
    Subscription,
    Errata,
    Purpose,
    PurposeSla,
    PurposeRole,
    PurposeUsage,
    PurposeAddons,
    Trace,
}

impl HostStatusKind {
    pub fn all() -> &'static [HostStatusKind] {
        &[
            HostStatusKind::Subscription,
            HostStatusKind::Errata,
            HostStatusKind::Purpose,
            HostStatusKind::PurposeSla,
            HostStatusKind::PurposeRole,
            HostStatusKind::PurposeUsage,
            HostStatusKind::PurposeAddons,
            HostStatusKind::Trace,
        ]
    }
}

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
}

/// A promotion stage a content view version is published into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEnvironment {
    pub id: EnvironmentId,
    pub name: String,
    pub organization: OrganizationId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentView {
    pub id: ContentViewId,
    pub name: String,
    pub organization: OrganizationId,
    /// The mutable default content view. Content removal is only allowed here.
    #[serde(default)]
    pub default: bool,
}

/// A content view published into an environment; the registration target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentViewEnvironment {
    pub content_view: ContentViewId,
    pub environment: EnvironmentId,
    /// Environment id as known to the identity provider.
    pub cp_id: String,
}

/// A repository replicated to capsules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub name: String,
    pub content_view: ContentViewId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentId>,
    pub content_type: ContentType,
    #[serde(default)]
    pub download_policy: DownloadPolicy,
    #[serde(default)]
    pub distribution_bootable: bool,
    /// Vendor-owned repositories are read-only.
    #[serde(default)]
    pub redhat: bool,
    #[serde(default)]
    pub package_count: u64,
    /// Last-known backend version reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publication_href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_contents_changed: Option<DateTime<Utc>>,
}

impl Repository {
    pub fn new(
        id: RepositoryId,
        name: impl Into<String>,
        content_view: ContentViewId,
        content_type: ContentType,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            content_view,
            environment: None,
            content_type,
            download_policy: DownloadPolicy::default(),
            distribution_bootable: false,
            redhat: false,
            package_count: 0,
            version_href: None,
            publication_href: None,
            last_contents_changed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    pub id: ContentUnitId,
    pub kind: ContentUnitKind,
    pub name: String,
    #[serde(default)]
    pub repositories: BTreeSet<RepositoryId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erratum {
    pub id: ErratumId,
    pub errata_id: String,
    #[serde(default)]
    pub security: bool,
}

/// An edge node mirroring a subset of repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub id: ProxyId,
    pub name: String,
    #[serde(default)]
    pub lifecycle_environments: BTreeSet<EnvironmentId>,
    /// Overrides the global `batch_size` setting when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    /// The primary backend node.
    #[serde(default)]
    pub primary: bool,
}

impl Proxy {
    pub fn new(id: ProxyId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            lifecycle_environments: BTreeSet::new(),
            batch_size: None,
            primary: false,
        }
    }
}

/// One (repository, proxy) sync record. A non-null `finished_at` marks the
/// repository as previously synced to that proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncHistoryEntry {
    pub repository: RepositoryId,
    pub proxy: ProxyId,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Hosts
// ---------------------------------------------------------------------------

/// A managed endpoint. Registered iff both facets exist in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub id: HostId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationId>,
    #[serde(default)]
    pub build: bool,
    #[serde(default)]
    pub facts: BTreeMap<String, String>,
    #[serde(default)]
    pub installed_packages: Vec<String>,
    #[serde(default)]
    pub statuses: BTreeMap<HostStatusKind, GlobalStatus>,
    #[serde(default)]
    pub global_status: GlobalStatus,
    #[serde(default)]
    pub host_collections: BTreeSet<HostCollectionId>,
}

impl Host {
    pub fn new(id: HostId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            organization: None,
            build: false,
            facts: BTreeMap::new(),
            installed_packages: Vec::new(),
            statuses: BTreeMap::new(),
            global_status: GlobalStatus::default(),
            host_collections: BTreeSet::new(),
        }
    }

    /// Recompute the aggregate status from the per-kind slots.
    pub fn refresh_global_status(&mut self) {
        self.global_status = self.statuses.values().copied().max().unwrap_or_default();
    }
}

/// Identity-provider side of a registered host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFacet {
    pub host: HostId,
    /// Consumer uuid assigned by the identity provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmi_uuid: Option<String>,
    /// Replacement identifier generated for a duplicated hardware uuid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dmi_uuid_override: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checkin: Option<DateTime<Utc>>,
    #[serde(default)]
    pub activation_keys: Vec<ActivationKeyId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_level: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose_usage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autoheal: Option<bool>,
    #[serde(default)]
    pub subscription_status: SubscriptionStatus,
}

impl SubscriptionFacet {
    pub fn new(host: HostId) -> Self {
        Self {
            host,
            uuid: None,
            dmi_uuid: None,
            dmi_uuid_override: None,
            user: None,
            last_checkin: None,
            activation_keys: Vec::new(),
            release_version: None,
            service_level: None,
            purpose_role: None,
            purpose_usage: None,
            autoheal: None,
            subscription_status: SubscriptionStatus::default(),
        }
    }
}

/// Content binding of a registered host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFacet {
    pub host: HostId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    pub content_view: ContentViewId,
    pub lifecycle_environment: EnvironmentId,
    #[serde(default)]
    pub bound_repositories: BTreeSet<RepositoryId>,
    #[serde(default)]
    pub applicable_errata: BTreeSet<ErratumId>,
    #[serde(default)]
    pub errata_status: ErrataStatus,
}

impl ContentFacet {
    pub fn new(host: HostId, content_view: ContentViewId, environment: EnvironmentId) -> Self {
        Self {
            host,
            uuid: None,
            content_view,
            lifecycle_environment: environment,
            bound_repositories: BTreeSet::new(),
            applicable_errata: BTreeSet::new(),
            errata_status: ErrataStatus::default(),
        }
    }
}

/// Reusable registration credential. Never mutated by registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationKey {
    pub id: ActivationKeyId,
    pub name: String,
    pub organization: OrganizationId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_view: Option<ContentViewId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<EnvironmentId>,
    #[serde(default)]
    pub host_collections: Vec<HostCollectionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCollection {
    pub id: HostCollectionId,
    pub name: String,
    pub organization: OrganizationId,
    #[serde(default)]
    pub unlimited_hosts: bool,
    /// Negative means no ceiling.
    #[serde(default)]
    pub max_hosts: i64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display_and_conversion() {
        assert_eq!(RepositoryId(7).to_string(), "7");
        assert_eq!(u64::from(HostId::from(3)), 3);
    }

    #[test]
    fn unit_kind_type_names() {
        assert_eq!(ContentUnitKind::Rpm.type_name(), "rpm");
        assert_eq!(ContentUnitKind::ModuleStream.type_name(), "modulemd");
        assert_eq!(
            ContentUnitKind::Generic("python_package".into()).type_name(),
            "python_package"
        );
    }

    #[test]
    fn global_status_takes_worst_slot() {
        let mut host = Host::new(HostId(1), "web01.example.com");
        host.refresh_global_status();
        assert_eq!(host.global_status, GlobalStatus::Ok);

        host.statuses
            .insert(HostStatusKind::Subscription, SubscriptionStatus::Valid.to_global());
        host.statuses
            .insert(HostStatusKind::Errata, ErrataStatus::SecurityNeeded.to_global());
        host.refresh_global_status();
        assert_eq!(host.global_status, GlobalStatus::Error);
    }

    #[test]
    fn entitlement_labels_map_to_status() {
        assert_eq!(
            SubscriptionStatus::from_entitlement(Some("valid")),
            SubscriptionStatus::Valid
        );
        assert_eq!(
            SubscriptionStatus::from_entitlement(None),
            SubscriptionStatus::Unknown
        );
    }

    #[test]
    fn repository_serde_roundtrip() {
        let mut repo = Repository::new(RepositoryId(1), "base", ContentViewId(1), ContentType::Yum);
        repo.download_policy = DownloadPolicy::OnDemand;
        let yaml = serde_yaml::to_string(&repo).expect("serialize");
        assert!(yaml.contains("on_demand"));
        let back: Repository = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, repo);
    }
}

//! Per-content-type sync capabilities.
//!
//! Each repository content type has one capability, selected by its
//! [`ContentType`] tag through [`capability_for`]. The set is closed: adding a
//! content type means adding a variant and a capability here.

use depot_core::{ContentType, DownloadPolicy, ProxyId, Repository};

use crate::plan::Task;

pub trait SyncCapability: Sync {
    fn content_type(&self) -> ContentType;

    /// Backend plugin that performs syncs for this content type.
    fn backend(&self) -> &'static str;

    /// Unit type names that may live in repositories of this type.
    fn unit_types(&self) -> &'static [&'static str];

    fn accepts_unit_type(&self, unit_type: &str) -> bool {
        self.unit_types().contains(&unit_type)
    }

    /// Whether the repository publishes metadata that host applicability is
    /// computed from.
    fn metadata_bearing(&self) -> bool {
        false
    }

    /// Whether a boot-file fetch must follow the sync of `repository`.
    fn fetches_boot_files(&self, _repository: &Repository) -> bool {
        false
    }

    fn sync_task(
        &self,
        repository: &Repository,
        proxy: ProxyId,
        skip_metadata_check: bool,
    ) -> Task {
        Task::SyncRepository {
            repository: repository.id,
            proxy,
            backend: self.backend().to_string(),
            skip_metadata_check,
        }
    }
}

/// Select the capability for a content type.
pub fn capability_for(content_type: ContentType) -> &'static dyn SyncCapability {
    match content_type {
        ContentType::Yum => &YumCapability,
        ContentType::Deb => &DebCapability,
        ContentType::File => &FileCapability,
        ContentType::Docker => &DockerCapability,
        ContentType::AnsibleCollection => &AnsibleCollectionCapability,
        ContentType::Python => &PythonCapability,
        ContentType::Ostree => &OstreeCapability,
    }
}

pub struct YumCapability;

impl SyncCapability for YumCapability {
    fn content_type(&self) -> ContentType {
        ContentType::Yum
    }

    fn backend(&self) -> &'static str {
        "rpm"
    }

    fn unit_types(&self) -> &'static [&'static str] {
        &["rpm", "srpm", "erratum", "package_group", "modulemd"]
    }

    fn metadata_bearing(&self) -> bool {
        true
    }

    // Lazily-synced kickstart trees do not carry their boot images; they are
    // fetched separately once the sync lands.
    fn fetches_boot_files(&self, repository: &Repository) -> bool {
        repository.distribution_bootable && repository.download_policy == DownloadPolicy::OnDemand
    }
}

pub struct DebCapability;

impl SyncCapability for DebCapability {
    fn content_type(&self) -> ContentType {
        ContentType::Deb
    }

    fn backend(&self) -> &'static str {
        "deb"
    }

    fn unit_types(&self) -> &'static [&'static str] {
        &["deb"]
    }
}

pub struct FileCapability;

impl SyncCapability for FileCapability {
    fn content_type(&self) -> ContentType {
        ContentType::File
    }

    fn backend(&self) -> &'static str {
        "file"
    }

    fn unit_types(&self) -> &'static [&'static str] {
        &["file"]
    }
}

pub struct DockerCapability;

impl SyncCapability for DockerCapability {
    fn content_type(&self) -> ContentType {
        ContentType::Docker
    }

    fn backend(&self) -> &'static str {
        "container"
    }

    fn unit_types(&self) -> &'static [&'static str] {
        &["docker_manifest", "docker_tag"]
    }
}

pub struct AnsibleCollectionCapability;

impl SyncCapability for AnsibleCollectionCapability {
    fn content_type(&self) -> ContentType {
        ContentType::AnsibleCollection
    }

    fn backend(&self) -> &'static str {
        "ansible"
    }

    fn unit_types(&self) -> &'static [&'static str] {
        &["ansible_collection"]
    }
}

pub struct PythonCapability;

impl SyncCapability for PythonCapability {
    fn content_type(&self) -> ContentType {
        ContentType::Python
    }

    fn backend(&self) -> &'static str {
        "python"
    }

    fn unit_types(&self) -> &'static [&'static str] {
        &["python_package"]
    }
}

pub struct OstreeCapability;

impl SyncCapability for OstreeCapability {
    fn content_type(&self) -> ContentType {
        ContentType::Ostree
    }

    fn backend(&self) -> &'static str {
        "ostree"
    }

    fn unit_types(&self) -> &'static [&'static str] {
        &["ostree_ref"]
    }
}

//! Local store: the single YAML document holding every persisted entity.
//!
//! # Storage layout
//!
//! ```text
//! ~/.depot/
//!   store.yaml      (mode 0600, replaced atomically on every save)
//!   settings.yaml   (see `settings`)
//! ```
//!
//! # API pattern
//!
//! Persistence functions have two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, not_found, StoreError};
use crate::types::{
    ActivationKey, ActivationKeyId, ContentFacet, ContentUnit, ContentUnitId, ContentView,
    ContentViewEnvironment, ContentViewId, EnvironmentId, Erratum, ErratumId, Host,
    HostCollection, HostCollectionId, HostId, LifecycleEnvironment, Organization,
    OrganizationId, Proxy, ProxyId, Repository, RepositoryId, SubscriptionFacet,
    SyncHistoryEntry,
};

/// In-memory tables of the local store.
///
/// Facets are keyed by their owning host; a host is registered iff it has an
/// entry in both facet tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalStore {
    #[serde(default)]
    next_id: u64,
    #[serde(default)]
    pub organizations: BTreeMap<OrganizationId, Organization>,
    #[serde(default)]
    pub environments: BTreeMap<EnvironmentId, LifecycleEnvironment>,
    #[serde(default)]
    pub content_views: BTreeMap<ContentViewId, ContentView>,
    #[serde(default)]
    pub content_view_environments: Vec<ContentViewEnvironment>,
    #[serde(default)]
    pub repositories: BTreeMap<RepositoryId, Repository>,
    #[serde(default)]
    pub content_units: BTreeMap<ContentUnitId, ContentUnit>,
    #[serde(default)]
    pub errata: BTreeMap<ErratumId, Erratum>,
    #[serde(default)]
    pub proxies: BTreeMap<ProxyId, Proxy>,
    #[serde(default)]
    pub sync_history: Vec<SyncHistoryEntry>,
    #[serde(default)]
    pub hosts: BTreeMap<HostId, Host>,
    #[serde(default)]
    pub subscription_facets: BTreeMap<HostId, SubscriptionFacet>,
    #[serde(default)]
    pub content_facets: BTreeMap<HostId, ContentFacet>,
    #[serde(default)]
    pub activation_keys: BTreeMap<ActivationKeyId, ActivationKey>,
    #[serde(default)]
    pub host_collections: BTreeMap<HostCollectionId, HostCollection>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next id. Ids are never reused, across all tables.
    pub fn allocate_id(&mut self) -> u64 {
        let highest = self.highest_known_id();
        self.next_id = self.next_id.max(highest) + 1;
        self.next_id
    }

    fn highest_known_id(&self) -> u64 {
        let hosts = self.hosts.keys().next_back().map(|id| id.0);
        let repos = self.repositories.keys().next_back().map(|id| id.0);
        let units = self.content_units.keys().next_back().map(|id| id.0);
        [hosts, repos, units].into_iter().flatten().max().unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Content
    // -----------------------------------------------------------------------

    pub fn insert_organization(&mut self, org: Organization) {
        self.organizations.insert(org.id, org);
    }

    pub fn organization(&self, id: OrganizationId) -> Result<&Organization, StoreError> {
        self.organizations
            .get(&id)
            .ok_or_else(|| not_found("organization", id))
    }

    pub fn insert_environment(&mut self, env: LifecycleEnvironment) {
        self.environments.insert(env.id, env);
    }

    pub fn environment(&self, id: EnvironmentId) -> Result<&LifecycleEnvironment, StoreError> {
        self.environments
            .get(&id)
            .ok_or_else(|| not_found("lifecycle environment", id))
    }

    pub fn insert_content_view(&mut self, view: ContentView) {
        self.content_views.insert(view.id, view);
    }

    pub fn content_view(&self, id: ContentViewId) -> Result<&ContentView, StoreError> {
        self.content_views
            .get(&id)
            .ok_or_else(|| not_found("content view", id))
    }

    pub fn insert_content_view_environment(&mut self, cve: ContentViewEnvironment) {
        self.content_view_environments
            .retain(|c| !(c.content_view == cve.content_view && c.environment == cve.environment));
        self.content_view_environments.push(cve);
    }

    pub fn content_view_environment(
        &self,
        content_view: ContentViewId,
        environment: EnvironmentId,
    ) -> Option<&ContentViewEnvironment> {
        self.content_view_environments
            .iter()
            .find(|c| c.content_view == content_view && c.environment == environment)
    }

    pub fn insert_repository(&mut self, repo: Repository) {
        self.repositories.insert(repo.id, repo);
    }

    pub fn repository(&self, id: RepositoryId) -> Result<&Repository, StoreError> {
        self.repositories
            .get(&id)
            .ok_or_else(|| not_found("repository", id))
    }

    pub fn repository_mut(&mut self, id: RepositoryId) -> Result<&mut Repository, StoreError> {
        self.repositories
            .get_mut(&id)
            .ok_or_else(|| not_found("repository", id))
    }

    pub fn insert_content_unit(&mut self, unit: ContentUnit) {
        self.content_units.insert(unit.id, unit);
    }

    pub fn content_unit(&self, id: ContentUnitId) -> Result<&ContentUnit, StoreError> {
        self.content_units
            .get(&id)
            .ok_or_else(|| not_found("content unit", id))
    }

    /// Detach a unit from a repository. Returns whether a membership existed.
    pub fn detach_content_unit(
        &mut self,
        unit: ContentUnitId,
        repository: RepositoryId,
    ) -> Result<bool, StoreError> {
        let unit = self
            .content_units
            .get_mut(&unit)
            .ok_or_else(|| not_found("content unit", unit))?;
        Ok(unit.repositories.remove(&repository))
    }

    pub fn insert_proxy(&mut self, proxy: Proxy) {
        self.proxies.insert(proxy.id, proxy);
    }

    pub fn proxy(&self, id: ProxyId) -> Result<&Proxy, StoreError> {
        self.proxies.get(&id).ok_or_else(|| not_found("proxy", id))
    }

    /// The primary backend node, if one is registered.
    pub fn primary_proxy(&self) -> Option<&Proxy> {
        self.proxies.values().find(|p| p.primary)
    }

    // -----------------------------------------------------------------------
    // Sync history
    // -----------------------------------------------------------------------

    pub fn sync_history_entry(
        &self,
        repository: RepositoryId,
        proxy: ProxyId,
    ) -> Option<&SyncHistoryEntry> {
        self.sync_history
            .iter()
            .find(|e| e.repository == repository && e.proxy == proxy)
    }

    /// Insert or replace the entry for `(entry.repository, entry.proxy)`.
    pub fn upsert_sync_history(&mut self, entry: SyncHistoryEntry) {
        match self
            .sync_history
            .iter_mut()
            .find(|e| e.repository == entry.repository && e.proxy == entry.proxy)
        {
            Some(existing) => *existing = entry,
            None => self.sync_history.push(entry),
        }
    }

    /// Remove every entry matching `pred`. Returns how many were removed.
    pub fn remove_sync_history_where(
        &mut self,
        mut pred: impl FnMut(&SyncHistoryEntry) -> bool,
    ) -> usize {
        let before = self.sync_history.len();
        self.sync_history.retain(|e| !pred(e));
        before - self.sync_history.len()
    }

    // -----------------------------------------------------------------------
    // Hosts
    // -----------------------------------------------------------------------

    pub fn insert_host(&mut self, host: Host) {
        self.hosts.insert(host.id, host);
    }

    pub fn host(&self, id: HostId) -> Result<&Host, StoreError> {
        self.hosts.get(&id).ok_or_else(|| not_found("host", id))
    }

    pub fn host_mut(&mut self, id: HostId) -> Result<&mut Host, StoreError> {
        self.hosts.get_mut(&id).ok_or_else(|| not_found("host", id))
    }

    pub fn remove_host(&mut self, id: HostId) -> Option<Host> {
        self.hosts.remove(&id)
    }

    pub fn hosts_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Host> + 'a {
        self.hosts.values().filter(move |h| h.name == name)
    }

    pub fn hosts_with_dmi_uuid<'a>(
        &'a self,
        dmi_uuid: &'a str,
    ) -> impl Iterator<Item = &'a Host> + 'a {
        self.subscription_facets
            .values()
            .filter(move |f| f.dmi_uuid.as_deref() == Some(dmi_uuid))
            .filter_map(move |f| self.hosts.get(&f.host))
    }

    /// Number of hosts currently in a host collection.
    pub fn host_collection_size(&self, id: HostCollectionId) -> usize {
        self.hosts
            .values()
            .filter(|h| h.host_collections.contains(&id))
            .count()
    }

    pub fn insert_host_collection(&mut self, collection: HostCollection) {
        self.host_collections.insert(collection.id, collection);
    }

    pub fn host_collection(&self, id: HostCollectionId) -> Result<&HostCollection, StoreError> {
        self.host_collections
            .get(&id)
            .ok_or_else(|| not_found("host collection", id))
    }

    pub fn insert_activation_key(&mut self, key: ActivationKey) {
        self.activation_keys.insert(key.id, key);
    }

    pub fn activation_key(&self, id: ActivationKeyId) -> Result<&ActivationKey, StoreError> {
        self.activation_keys
            .get(&id)
            .ok_or_else(|| not_found("activation key", id))
    }

    pub fn subscription_facet(&self, host: HostId) -> Option<&SubscriptionFacet> {
        self.subscription_facets.get(&host)
    }

    pub fn subscription_facet_mut(&mut self, host: HostId) -> Option<&mut SubscriptionFacet> {
        self.subscription_facets.get_mut(&host)
    }

    pub fn content_facet(&self, host: HostId) -> Option<&ContentFacet> {
        self.content_facets.get(&host)
    }

    pub fn content_facet_mut(&mut self, host: HostId) -> Option<&mut ContentFacet> {
        self.content_facets.get_mut(&host)
    }

    /// A host is registered iff both of its facets exist.
    pub fn is_registered(&self, host: HostId) -> bool {
        self.subscription_facets.contains_key(&host) && self.content_facets.contains_key(&host)
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.depot/`
pub fn depot_root(home: &Path) -> PathBuf {
    home.join(".depot")
}

/// `<home>/.depot/store.yaml`: pure, no I/O.
pub fn store_path_at(home: &Path) -> PathBuf {
    depot_root(home).join("store.yaml")
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Load the store from `<home>/.depot/store.yaml`.
///
/// Returns `StoreError::StoreNotFound` if absent,
/// `StoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<LocalStore, StoreError> {
    let path = store_path_at(home);
    if !path.exists() {
        return Err(StoreError::StoreNotFound { path });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse { path, source: e })
}

/// Like [`load_at`], but a missing file yields an empty store.
pub fn load_or_default_at(home: &Path) -> Result<LocalStore, StoreError> {
    match load_at(home) {
        Err(StoreError::StoreNotFound { .. }) => Ok(LocalStore::default()),
        other => other,
    }
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<LocalStore, StoreError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the store to `<home>/.depot/store.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem).
pub fn save_at(home: &Path, store: &LocalStore) -> Result<(), StoreError> {
    let dir = depot_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = store_path_at(home);
    let tmp_path = path.with_file_name("store.yaml.tmp");

    let yaml = serde_yaml::to_string(store)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    if let Err(e) = std::fs::rename(&tmp_path, &path) {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(store: &LocalStore) -> Result<(), StoreError> {
    save_at(&home()?, store)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub(crate) fn home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    use crate::types::{ContentType, SubscriptionFacet};

    fn entry(repo: u64, proxy: u64, finished: bool) -> SyncHistoryEntry {
        let now = Utc::now();
        SyncHistoryEntry {
            repository: RepositoryId(repo),
            proxy: ProxyId(proxy),
            started_at: now,
            finished_at: finished.then_some(now),
        }
    }

    #[test]
    fn store_path_is_correct() {
        let home = TempDir::new().unwrap();
        assert!(store_path_at(home.path()).ends_with(".depot/store.yaml"));
    }

    #[test]
    fn allocated_ids_are_unique_and_skip_existing_records() {
        let mut store = LocalStore::new();
        store.insert_host(Host::new(HostId(10), "a"));
        let first = store.allocate_id();
        let second = store.allocate_id();
        assert_eq!(first, 11);
        assert_eq!(second, 12);
    }

    #[test]
    fn upsert_replaces_existing_pair() {
        let mut store = LocalStore::new();
        store.upsert_sync_history(entry(1, 1, false));
        store.upsert_sync_history(entry(1, 1, true));
        store.upsert_sync_history(entry(1, 2, false));
        assert_eq!(store.sync_history.len(), 2);
        assert!(store
            .sync_history_entry(RepositoryId(1), ProxyId(1))
            .unwrap()
            .finished_at
            .is_some());
    }

    #[test]
    fn remove_sync_history_where_counts_removed() {
        let mut store = LocalStore::new();
        store.upsert_sync_history(entry(1, 1, true));
        store.upsert_sync_history(entry(1, 2, true));
        store.upsert_sync_history(entry(2, 1, true));
        let removed = store.remove_sync_history_where(|e| e.repository == RepositoryId(1));
        assert_eq!(removed, 2);
        assert_eq!(store.sync_history.len(), 1);
    }

    #[test]
    fn hosts_with_dmi_uuid_joins_through_facets() {
        let mut store = LocalStore::new();
        store.insert_host(Host::new(HostId(1), "a.example.com"));
        store.insert_host(Host::new(HostId(2), "b.example.com"));
        let mut facet = SubscriptionFacet::new(HostId(2));
        facet.dmi_uuid = Some("abc".into());
        store.subscription_facets.insert(HostId(2), facet);

        let names: Vec<_> = store.hosts_with_dmi_uuid("abc").map(|h| h.name.clone()).collect();
        assert_eq!(names, vec!["b.example.com".to_string()]);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = TempDir::new().unwrap();
        let mut store = LocalStore::new();
        store.insert_repository(Repository::new(
            RepositoryId(1),
            "base",
            ContentViewId(1),
            ContentType::Yum,
        ));
        store.upsert_sync_history(entry(1, 1, true));
        save_at(home.path(), &store).expect("save");
        let loaded = load_at(home.path()).expect("load");
        assert_eq!(loaded, store);
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let home = TempDir::new().unwrap();
        save_at(home.path(), &LocalStore::new()).expect("save");
        let tmp = store_path_at(home.path()).with_file_name("store.yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn load_missing_store_returns_not_found() {
        let home = TempDir::new().unwrap();
        let err = load_at(home.path()).unwrap_err();
        assert!(matches!(err, StoreError::StoreNotFound { .. }));
        let empty = load_or_default_at(home.path()).expect("default");
        assert!(empty.hosts.is_empty());
    }

    #[test]
    fn home_not_found_error_message() {
        assert!(StoreError::HomeNotFound.to_string().contains("home directory"));
    }
}

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

use depot_core::{
    ActivationKey, ActivationKeyId, ContentFacet, ContentViewEnvironment, ContentViewId,
    EnvironmentId, ErratumId, GlobalStatus, Host, HostCollection, HostCollectionId, HostId,
    HostStatusKind, LifecycleEnvironment, LocalStore, Organization, OrganizationId, RepositoryId,
    Settings, SubscriptionFacet, SubscriptionStatus,
};
use depot_registration::{
    unregister_host, ConsumerParams, IdentityProvider, ProviderError, RegistrationError,
    RegistrationManager, UnregisterMode,
};
use rstest::{fixture, rstest};
use serde_json::{json, Map, Value};

const ACME: OrganizationId = OrganizationId(1);
const GLOBEX: OrganizationId = OrganizationId(2);
const LIBRARY: EnvironmentId = EnvironmentId(10);
const VIEW: ContentViewId = ContentViewId(1);

#[derive(Default)]
struct FakeProvider {
    fail_create: bool,
    fail_attributes: bool,
    down: bool,
    created: RefCell<Vec<(String, Vec<String>)>>,
    destroyed: RefCell<Vec<String>>,
    attribute_reads: Cell<usize>,
}

impl IdentityProvider for FakeProvider {
    fn create_consumer(
        &self,
        environment_cp_id: &str,
        params: &ConsumerParams,
        activation_keys: &[String],
    ) -> Result<String, ProviderError> {
        if self.fail_create {
            return Err(ProviderError::Failed("consumer create rejected".into()));
        }
        self.created
            .borrow_mut()
            .push((environment_cp_id.to_string(), activation_keys.to_vec()));
        Ok(params.uuid.clone().unwrap_or_default())
    }

    fn destroy_consumer(&self, uuid: &str) -> Result<(), ProviderError> {
        self.destroyed.borrow_mut().push(uuid.to_string());
        Ok(())
    }

    fn consumer_attributes(&self, _uuid: &str) -> Result<Map<String, Value>, ProviderError> {
        self.attribute_reads.set(self.attribute_reads.get() + 1);
        if self.fail_attributes {
            return Err(ProviderError::Failed("timeout".into()));
        }
        let attrs = json!({
            "serviceLevel": "Premium",
            "releaseVer": "8.6",
            "entitlementStatus": "valid",
            "guestIds": ["guest-1"],
            "facts": {"network.fqdn": "ignored.example.com"},
        });
        Ok(attrs.as_object().cloned().unwrap_or_default())
    }

    fn ping(&self) -> Result<(), ProviderError> {
        if self.down {
            return Err(ProviderError::Failed("connection refused".into()));
        }
        Ok(())
    }
}

#[fixture]
fn store() -> LocalStore {
    let mut store = LocalStore::new();
    store.insert_organization(Organization {
        id: ACME,
        name: "ACME".into(),
    });
    store.insert_organization(Organization {
        id: GLOBEX,
        name: "Globex".into(),
    });
    store.insert_environment(LifecycleEnvironment {
        id: LIBRARY,
        name: "Library".into(),
        organization: ACME,
    });
    store.insert_content_view_environment(cve());
    store.insert_host_collection(HostCollection {
        id: HostCollectionId(1),
        name: "web".into(),
        organization: ACME,
        unlimited_hosts: false,
        max_hosts: 1,
    });
    store.insert_activation_key(ActivationKey {
        id: ActivationKeyId(1),
        name: "ak-library".into(),
        organization: ACME,
        content_view: Some(VIEW),
        environment: Some(LIBRARY),
        host_collections: vec![HostCollectionId(1)],
    });
    store.insert_activation_key(ActivationKey {
        id: ActivationKeyId(2),
        name: "ak-bare".into(),
        organization: ACME,
        content_view: None,
        environment: None,
        host_collections: Vec::new(),
    });
    store
}

fn cve() -> ContentViewEnvironment {
    ContentViewEnvironment {
        content_view: VIEW,
        environment: LIBRARY,
        cp_id: "acme-library".into(),
    }
}

fn params(fqdn: &str, dmi: &str) -> ConsumerParams {
    let facts: BTreeMap<String, String> = [
        ("network.fqdn".to_string(), fqdn.to_string()),
        ("dmi.system.uuid".to_string(), dmi.to_string()),
    ]
    .into();
    ConsumerParams {
        facts,
        ..ConsumerParams::default()
    }
}

/// A host registered in `org` with hardware id `dmi` and some bound content.
fn registered_host(
    store: &mut LocalStore,
    id: u64,
    name: &str,
    org: Option<OrganizationId>,
    dmi: &str,
) {
    let mut host = Host::new(HostId(id), name);
    host.organization = org;
    host.installed_packages.push("bash".into());
    store.insert_host(host);

    let mut sub = SubscriptionFacet::new(HostId(id));
    sub.uuid = Some(format!("consumer-{id}"));
    sub.dmi_uuid = Some(dmi.into());
    store.subscription_facets.insert(HostId(id), sub);

    let mut content = ContentFacet::new(HostId(id), VIEW, LIBRARY);
    content.uuid = Some(format!("consumer-{id}"));
    content.bound_repositories.insert(RepositoryId(3));
    content.applicable_errata.insert(ErratumId(7));
    store.content_facets.insert(HostId(id), content);
}

#[rstest]
fn new_host_is_fully_registered(mut store: LocalStore) {
    let provider = FakeProvider::default();
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider).with_user("admin");

    let id = manager
        .process_registration(&mut store, params("Web01.example.com", "aaa"), Some(cve()), &[])
        .unwrap();

    let host = store.host(id).unwrap();
    assert_eq!(host.name, "web01.example.com");
    assert_eq!(host.organization, Some(ACME));
    assert_eq!(host.facts.get("dmi.system.uuid").map(String::as_str), Some("aaa"));
    assert_eq!(host.statuses[&HostStatusKind::Subscription], GlobalStatus::Ok);
    assert_eq!(host.statuses[&HostStatusKind::Errata], GlobalStatus::Ok);
    assert!(store.is_registered(id));

    let sub = store.subscription_facet(id).unwrap();
    assert_eq!(sub.dmi_uuid.as_deref(), Some("aaa"));
    assert_eq!(sub.service_level.as_deref(), Some("Premium"));
    assert_eq!(sub.release_version.as_deref(), Some("8.6"));
    assert_eq!(sub.subscription_status, SubscriptionStatus::Valid);
    assert_eq!(sub.user.as_deref(), Some("admin"));
    assert!(sub.last_checkin.is_some());

    let content = store.content_facet(id).unwrap();
    assert_eq!(content.uuid, sub.uuid);
    assert_eq!(provider.created.borrow()[0].0, "acme-library");
}

#[rstest]
fn unassigned_org_host_is_reused(mut store: LocalStore) {
    registered_host(&mut store, 50, "web01", None, "aaa");
    registered_host(&mut store, 51, "web01", Some(GLOBEX), "zzz");
    let provider = FakeProvider::default();
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider);

    let id = manager
        .process_registration(&mut store, params("web01", "aaa"), Some(cve()), &[])
        .unwrap();

    assert_eq!(id, HostId(50));
    assert_eq!(store.host(id).unwrap().organization, Some(ACME));
    assert_eq!(*provider.destroyed.borrow(), vec!["consumer-50".to_string()]);
    assert!(store.content_facet(id).unwrap().bound_repositories.is_empty());
    assert_eq!(store.host(HostId(51)).unwrap().organization, Some(GLOBEX));
}

#[rstest]
fn dmi_mismatch_is_rejected_before_any_change(mut store: LocalStore) {
    registered_host(&mut store, 50, "web01", Some(ACME), "X");
    let before = store.clone();
    let provider = FakeProvider::default();
    let settings = Settings {
        host_profile_assume: false,
        host_profile_assume_build_can_change: false,
        ..Settings::default()
    };
    let manager = RegistrationManager::new(&settings, &provider);

    let err = manager
        .process_registration(&mut store, params("web01", "Y"), Some(cve()), &[])
        .unwrap_err();

    assert!(matches!(err, RegistrationError::DmiUuidChanged));
    assert_eq!(store, before);
    assert!(provider.created.borrow().is_empty());
    assert!(provider.destroyed.borrow().is_empty());
}

#[rstest]
fn provider_failure_rolls_back_new_host(mut store: LocalStore) {
    let provider = FakeProvider {
        fail_create: true,
        ..FakeProvider::default()
    };
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider);

    let err = manager
        .process_registration(&mut store, params("web01", "aaa"), Some(cve()), &[])
        .unwrap_err();

    assert!(matches!(err, RegistrationError::Provider(ProviderError::Failed(_))));
    assert!(store.hosts.is_empty());
    assert!(store.subscription_facets.is_empty());
    assert!(store.content_facets.is_empty());
}

#[rstest]
fn provider_failure_keeps_existing_host_record(mut store: LocalStore) {
    registered_host(&mut store, 50, "web01", Some(ACME), "aaa");
    let provider = FakeProvider {
        fail_create: true,
        ..FakeProvider::default()
    };
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider);

    manager
        .process_registration(&mut store, params("web01", "aaa"), Some(cve()), &[])
        .unwrap_err();

    let host = store.host(HostId(50)).unwrap();
    assert!(host.installed_packages.is_empty());
    assert!(host.statuses.is_empty());
    assert!(store.subscription_facet(HostId(50)).is_none());
    let content = store.content_facet(HostId(50)).unwrap();
    assert!(content.bound_repositories.is_empty());
    assert_eq!(content.uuid, None);
}

#[rstest]
fn finalize_failure_is_not_rolled_back(mut store: LocalStore) {
    let provider = FakeProvider {
        fail_attributes: true,
        ..FakeProvider::default()
    };
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider);

    let err = manager
        .process_registration(&mut store, params("web01", "aaa"), Some(cve()), &[])
        .unwrap_err();

    assert!(matches!(err, RegistrationError::Provider(_)));
    assert_eq!(provider.created.borrow().len(), 1);
    assert_eq!(store.hosts.len(), 1);
    assert_eq!(store.subscription_facets.len(), 1);
}

#[rstest]
fn activation_key_supplies_environment_and_collections(mut store: LocalStore) {
    let provider = FakeProvider::default();
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider);

    let id = manager
        .process_registration(
            &mut store,
            params("web01", "aaa"),
            None,
            &[ActivationKeyId(1), ActivationKeyId(2)],
        )
        .unwrap();

    let host = store.host(id).unwrap();
    assert!(host.host_collections.contains(&HostCollectionId(1)));
    assert_eq!(store.content_facet(id).unwrap().lifecycle_environment, LIBRARY);
    assert_eq!(
        store.subscription_facet(id).unwrap().activation_keys,
        vec![ActivationKeyId(1), ActivationKeyId(2)]
    );
    assert_eq!(
        provider.created.borrow()[0].1,
        vec!["ak-library".to_string(), "ak-bare".to_string()]
    );
}

#[rstest]
fn full_host_collection_rejects_registration(mut store: LocalStore) {
    let mut member = Host::new(HostId(60), "already-in");
    member.host_collections.insert(HostCollectionId(1));
    store.insert_host(member);
    let provider = FakeProvider::default();
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider);

    let err = manager
        .process_registration(&mut store, params("web01", "aaa"), None, &[ActivationKeyId(1)])
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "Host collection 'web' exceeds maximum usage limit of '1'"
    );
    assert_eq!(store.hosts.len(), 1);
}

#[rstest]
fn key_without_environment_is_rejected(mut store: LocalStore) {
    let provider = FakeProvider::default();
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider);

    let err = manager
        .process_registration(&mut store, params("web01", "aaa"), None, &[ActivationKeyId(2)])
        .unwrap_err();
    assert!(matches!(err, RegistrationError::NoActivationKeyEnvironment));
    assert!(store.hosts.is_empty());
}

#[rstest]
fn duplicated_dmi_uuid_is_overridden_and_recorded(mut store: LocalStore) {
    registered_host(&mut store, 50, "other-host", Some(ACME), "template");
    let provider = FakeProvider::default();
    let settings = Settings {
        host_dmi_uuid_duplicates: vec!["template".into()],
        ..Settings::default()
    };
    let manager = RegistrationManager::new(&settings, &provider);

    let id = manager
        .process_registration(&mut store, params("web01", "template"), Some(cve()), &[])
        .unwrap();

    assert_ne!(id, HostId(50));
    let sub = store.subscription_facet(id).unwrap();
    assert!(sub.dmi_uuid_override.is_some());
    assert_eq!(sub.dmi_uuid, sub.dmi_uuid_override);
    assert_ne!(sub.dmi_uuid.as_deref(), Some("template"));
}

#[rstest]
fn unregister_only_preserves_host_and_content_facet(mut store: LocalStore) {
    registered_host(&mut store, 50, "web01", Some(ACME), "aaa");
    let provider = FakeProvider::default();

    unregister_host(&mut store, &provider, HostId(50), UnregisterMode::Unregister).unwrap();

    assert!(store.host(HostId(50)).is_ok());
    assert!(store.subscription_facet(HostId(50)).is_none());
    let content = store.content_facet(HostId(50)).unwrap();
    assert!(content.bound_repositories.is_empty());
    assert!(content.applicable_errata.is_empty());
    assert!(!store.is_registered(HostId(50)));
}

#[rstest]
#[case(false, true)]
#[case(true, false)]
fn registration_services_follow_provider_ping(#[case] down: bool, #[case] expected: bool) {
    let provider = FakeProvider {
        down,
        ..FakeProvider::default()
    };
    let settings = Settings::default();
    let manager = RegistrationManager::new(&settings, &provider);
    assert_eq!(manager.check_registration_services(), expected);
}

//! Identity derivation for a registering host.

use std::collections::BTreeSet;

use depot_core::{
    ActivationKey, ContentViewEnvironment, Host, HostId, LocalStore, OrganizationId, Settings,
};

use crate::error::RegistrationError;
use crate::provider::ConsumerParams;

/// Hardware identifier used for conflict detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmiUuid {
    pub value: Option<String>,
    /// `value` is a generated replacement for a known-duplicated identifier.
    pub overridden: bool,
}

/// Read the reported hardware identifier, replacing it with a random one when
/// it is configured as always duplicated.
pub fn determine_dmi_uuid(settings: &Settings, params: &ConsumerParams) -> DmiUuid {
    let reported = params.dmi_uuid();
    if settings.override_dmi_uuid(reported) {
        let replacement = uuid::Uuid::new_v4().to_string();
        tracing::info!(
            reported = reported.unwrap_or_default(),
            replacement = %replacement,
            "overriding duplicated DMI UUID",
        );
        return DmiUuid {
            value: Some(replacement),
            overridden: true,
        };
    }
    DmiUuid {
        value: reported.map(str::to_string),
        overridden: false,
    }
}

/// The content view environment's organization, else the first activation
/// key's.
pub fn determine_organization(
    store: &LocalStore,
    content_view_environment: Option<&ContentViewEnvironment>,
    activation_keys: &[ActivationKey],
) -> Result<OrganizationId, RegistrationError> {
    if let Some(cve) = content_view_environment {
        return Ok(store.environment(cve.environment)?.organization);
    }
    activation_keys
        .first()
        .map(|key| key.organization)
        .ok_or(RegistrationError::UnknownOrganization)
}

/// Hosts named `host_name`, plus hosts whose subscription facet carries
/// `dmi_uuid` unless that identifier is allowed to repeat. Ordered by id.
pub fn find_existing_hosts(
    store: &LocalStore,
    host_name: &str,
    dmi_uuid: Option<&str>,
) -> Vec<HostId> {
    let mut found: BTreeSet<HostId> = store.hosts_named(host_name).map(|h| h.id).collect();
    if let Some(uuid) = dmi_uuid.filter(|uuid| !Settings::dmi_uuid_allowed_dup(uuid)) {
        found.extend(store.hosts_with_dmi_uuid(uuid).map(|h| h.id));
    }
    found.into_iter().collect()
}

/// Whether an existing host may present a different hardware identifier.
pub fn dmi_uuid_change_allowed(settings: &Settings, host: &Host, overridden: bool) -> bool {
    overridden
        || (host.build && settings.host_profile_assume_build_can_change)
        || settings.host_profile_assume
}

#[cfg(test)]
mod tests {
    use super::*;
    use depot_core::SubscriptionFacet;

    fn params_with_dmi(uuid: &str) -> ConsumerParams {
        let mut params = ConsumerParams::default();
        params.facts.insert("dmi.system.uuid".into(), uuid.into());
        params
    }

    fn host_with_dmi(store: &mut LocalStore, id: u64, name: &str, dmi: &str) {
        store.insert_host(Host::new(HostId(id), name));
        let mut facet = SubscriptionFacet::new(HostId(id));
        facet.dmi_uuid = Some(dmi.into());
        store.subscription_facets.insert(HostId(id), facet);
    }

    #[test]
    fn configured_duplicate_is_replaced() {
        let settings = Settings {
            host_dmi_uuid_duplicates: vec!["template-uuid".into()],
            ..Settings::default()
        };
        let dmi = determine_dmi_uuid(&settings, &params_with_dmi("template-uuid"));
        assert!(dmi.overridden);
        assert_ne!(dmi.value.as_deref(), Some("template-uuid"));

        let dmi = determine_dmi_uuid(&settings, &params_with_dmi("unique"));
        assert_eq!(
            dmi,
            DmiUuid {
                value: Some("unique".into()),
                overridden: false,
            }
        );
    }

    #[test]
    fn existing_hosts_union_name_and_dmi() {
        let mut store = LocalStore::new();
        host_with_dmi(&mut store, 1, "web01", "aaa");
        host_with_dmi(&mut store, 2, "web02", "bbb");
        host_with_dmi(&mut store, 3, "web03", "Not Settable");

        assert_eq!(
            find_existing_hosts(&store, "web01", Some("bbb")),
            vec![HostId(1), HostId(2)]
        );
        assert_eq!(
            find_existing_hosts(&store, "web01", Some("aaa")),
            vec![HostId(1)]
        );
    }

    #[test]
    fn allowed_duplicates_skip_dmi_lookup() {
        let mut store = LocalStore::new();
        host_with_dmi(&mut store, 3, "web03", "Not Settable");
        assert!(find_existing_hosts(&store, "new", Some("Not Settable")).is_empty());
        assert!(find_existing_hosts(&store, "new", None).is_empty());
    }

    #[test]
    fn dmi_change_policy() {
        let strict = Settings {
            host_profile_assume: false,
            ..Settings::default()
        };
        let mut host = Host::new(HostId(1), "web01");
        assert!(!dmi_uuid_change_allowed(&strict, &host, false));
        assert!(dmi_uuid_change_allowed(&strict, &host, true));

        host.build = true;
        assert!(!dmi_uuid_change_allowed(&strict, &host, false));
        let build_can_change = Settings {
            host_profile_assume_build_can_change: true,
            ..strict
        };
        assert!(dmi_uuid_change_allowed(&build_can_change, &host, false));
        assert!(dmi_uuid_change_allowed(&Settings::default(), &host, false));
    }
}

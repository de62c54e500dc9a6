//! Host registration.
//!
//! [`RegistrationManager::process_registration`] derives the host's identity,
//! validates it against existing hosts, and hands the chosen host to
//! [`RegistrationManager::register_host`], which runs the registration saga:
//!
//! | step | compensation |
//! |---|---|
//! | save host record | new host: destroy the record |
//! | clear previous registration (existing host) | none |
//! | bind host collections | none |
//! | content facet | new host: destroy it; existing host: strip artifacts |
//! | subscription facet | destroy it |
//! | initial subscription status | none |
//! | **create provider consumer** (pivot) | none |
//! | finalize from consumer attributes | not compensated |

use std::collections::BTreeSet;

use chrono::Utc;

use depot_core::error::not_found;
use depot_core::{
    ActivationKey, ActivationKeyId, ContentFacet, ContentViewEnvironment, ErrataStatus, Host,
    HostCollectionId, HostId, HostStatusKind, LocalStore, Settings, SubscriptionFacet,
    SubscriptionStatus,
};

use crate::conflict::validate_hosts;
use crate::error::RegistrationError;
use crate::identity::{determine_dmi_uuid, determine_organization, find_existing_hosts};
use crate::provider::{
    ConsumerAttributes, ConsumerParams, FactsHostNaming, HostNaming, IdentityProvider,
    DMI_UUID_FACT,
};
use crate::saga::Saga;
use crate::unregister::{
    destroy_host_record, remove_host_artifacts, unregister_host, UnregisterMode,
};

pub struct RegistrationManager<'a> {
    settings: &'a Settings,
    provider: &'a dyn IdentityProvider,
    naming: &'a dyn HostNaming,
    /// Recorded on the subscription facet as the registering user.
    user: Option<String>,
}

impl<'a> RegistrationManager<'a> {
    pub fn new(settings: &'a Settings, provider: &'a dyn IdentityProvider) -> Self {
        Self {
            settings,
            provider,
            naming: &FactsHostNaming,
            user: None,
        }
    }

    pub fn with_naming(mut self, naming: &'a dyn HostNaming) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Register the host described by `params`, reusing an existing host
    /// record when identity validation selects one.
    pub fn process_registration(
        &self,
        store: &mut LocalStore,
        mut params: ConsumerParams,
        content_view_environment: Option<ContentViewEnvironment>,
        activation_keys: &[ActivationKeyId],
    ) -> Result<HostId, RegistrationError> {
        let host_name = self
            .naming
            .propose_hostname(&params.facts)
            .ok_or(RegistrationError::MissingHostname)?;
        let dmi = determine_dmi_uuid(self.settings, &params);
        if let Some(value) = &dmi.value {
            params.facts.insert(DMI_UUID_FACT.to_string(), value.clone());
        }

        let keys = activation_keys
            .iter()
            .map(|id| store.activation_key(*id).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let organization =
            determine_organization(store, content_view_environment.as_ref(), &keys)?;

        let candidates = find_existing_hosts(store, &host_name, dmi.value.as_deref());
        let target = validate_hosts(
            store,
            self.settings,
            &candidates,
            organization,
            &host_name,
            dmi.value.as_deref(),
            dmi.overridden,
        )?;

        let mut host = match target {
            Some(id) => store.host(id)?.clone(),
            None => Host::new(HostId(store.allocate_id()), host_name),
        };
        if host.organization.is_none() {
            host.organization = Some(organization);
        }

        let id = self.register_host(store, host, params, content_view_environment, &keys)?;

        if dmi.overridden {
            if let Some(facet) = store.subscription_facet_mut(id) {
                facet.dmi_uuid_override = dmi.value;
            }
        }
        Ok(id)
    }

    /// Register `host`. A host not yet in the store is created; an existing
    /// one is unregistered first and registered again from a clean slate.
    pub fn register_host(
        &self,
        store: &mut LocalStore,
        host: Host,
        mut params: ConsumerParams,
        content_view_environment: Option<ContentViewEnvironment>,
        activation_keys: &[ActivationKey],
    ) -> Result<HostId, RegistrationError> {
        let new_host = !store.hosts.contains_key(&host.id);

        let mut content_view_environment = content_view_environment;
        let mut host_collections = None;
        if !activation_keys.is_empty() {
            if content_view_environment.is_none() {
                content_view_environment =
                    Some(lookup_content_view_environment(store, activation_keys)?);
            }
            host_collections = Some(check_host_collections(store, activation_keys)?);
        }
        let content_view_environment =
            content_view_environment.ok_or(RegistrationError::MissingContentViewEnvironment)?;

        let uuid = params
            .uuid
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        params.uuid = Some(uuid.clone());

        let mut registration = Registration {
            store,
            provider: self.provider,
            host,
            new_host,
            host_collections,
            content_view_environment,
            activation_keys: activation_keys.to_vec(),
            params,
            uuid,
            user: self.user.clone(),
        };
        registration_saga().run(&mut registration)?;

        tracing::info!(
            host = %registration.host.name,
            id = %registration.host.id,
            consumer = %registration.uuid,
            new_host,
            "registered host",
        );
        Ok(registration.host.id)
    }

    /// Whether the identity provider answers.
    pub fn check_registration_services(&self) -> bool {
        match self.provider.ping() {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "identity provider is not available");
                false
            }
        }
    }
}

/// Content view environment of the last activation key carrying both a
/// content view and an environment.
fn lookup_content_view_environment(
    store: &LocalStore,
    activation_keys: &[ActivationKey],
) -> Result<ContentViewEnvironment, RegistrationError> {
    let key = activation_keys
        .iter()
        .rev()
        .find(|key| key.content_view.is_some() && key.environment.is_some())
        .ok_or(RegistrationError::NoActivationKeyEnvironment)?;
    match (key.content_view, key.environment) {
        (Some(cv), Some(env)) => store
            .content_view_environment(cv, env)
            .cloned()
            .ok_or(RegistrationError::MissingContentViewEnvironment),
        _ => Err(RegistrationError::NoActivationKeyEnvironment),
    }
}

/// Union of the keys' host collections, rejecting any collection at its
/// ceiling.
fn check_host_collections(
    store: &LocalStore,
    activation_keys: &[ActivationKey],
) -> Result<BTreeSet<HostCollectionId>, RegistrationError> {
    let ids: BTreeSet<HostCollectionId> = activation_keys
        .iter()
        .flat_map(|key| key.host_collections.iter().copied())
        .collect();
    for id in &ids {
        let collection = store.host_collection(*id)?;
        let members = store.host_collection_size(*id) as i64;
        if !collection.unlimited_hosts
            && collection.max_hosts >= 0
            && members >= collection.max_hosts
        {
            return Err(RegistrationError::HostCollectionFull {
                name: collection.name.clone(),
                limit: collection.max_hosts,
            });
        }
    }
    Ok(ids)
}

// ---------------------------------------------------------------------------
// Registration saga
// ---------------------------------------------------------------------------

struct Registration<'a> {
    store: &'a mut LocalStore,
    provider: &'a dyn IdentityProvider,
    host: Host,
    new_host: bool,
    host_collections: Option<BTreeSet<HostCollectionId>>,
    content_view_environment: ContentViewEnvironment,
    activation_keys: Vec<ActivationKey>,
    params: ConsumerParams,
    uuid: String,
    user: Option<String>,
}

fn registration_saga<'a>() -> Saga<Registration<'a>, RegistrationError> {
    Saga::new("register host")
        .compensated("save host record", save_host, forget_new_host)
        .step("clear previous registration", clear_previous_registration)
        .step("bind host collections", bind_host_collections)
        .compensated("content facet", populate_content_facet, undo_content_facet)
        .compensated(
            "subscription facet",
            populate_subscription_facet,
            destroy_subscription_facet,
        )
        .step("initial subscription status", initial_subscription_status)
        .pivot("create consumer", create_consumer)
        .step("finalize registration", finalize_registration)
}

fn save_host(reg: &mut Registration<'_>) -> Result<(), RegistrationError> {
    reg.store.insert_host(reg.host.clone());
    Ok(())
}

fn forget_new_host(reg: &mut Registration<'_>) {
    if reg.new_host {
        destroy_host_record(reg.store, reg.host.id);
    }
}

fn clear_previous_registration(reg: &mut Registration<'_>) -> Result<(), RegistrationError> {
    if reg.new_host {
        return Ok(());
    }
    unregister_host(reg.store, reg.provider, reg.host.id, UnregisterMode::Unregister)?;
    reg.host = reg.store.host(reg.host.id)?.clone();
    Ok(())
}

fn bind_host_collections(reg: &mut Registration<'_>) -> Result<(), RegistrationError> {
    if let Some(collections) = &reg.host_collections {
        reg.store.host_mut(reg.host.id)?.host_collections = collections.clone();
    }
    Ok(())
}

fn populate_content_facet(reg: &mut Registration<'_>) -> Result<(), RegistrationError> {
    let id = reg.host.id;
    let cve = &reg.content_view_environment;
    let mut facet = reg
        .store
        .content_facet(id)
        .cloned()
        .unwrap_or_else(|| ContentFacet::new(id, cve.content_view, cve.environment));
    facet.content_view = cve.content_view;
    facet.lifecycle_environment = cve.environment;
    facet.uuid = Some(reg.uuid.clone());
    reg.store.content_facets.insert(id, facet);
    Ok(())
}

fn undo_content_facet(reg: &mut Registration<'_>) {
    if reg.new_host {
        reg.store.content_facets.remove(&reg.host.id);
    } else if let Err(err) = remove_host_artifacts(reg.store, reg.host.id, true) {
        tracing::warn!(host = %reg.host.id, error = %err, "could not strip host artifacts");
    }
}

fn populate_subscription_facet(reg: &mut Registration<'_>) -> Result<(), RegistrationError> {
    let id = reg.host.id;
    let mut facet = reg
        .store
        .subscription_facet(id)
        .cloned()
        .unwrap_or_else(|| SubscriptionFacet::new(id));
    facet.last_checkin = Some(Utc::now());
    apply_consumer_attributes(&mut facet, &reg.params.attributes);
    facet.dmi_uuid = reg.params.dmi_uuid().map(str::to_string);
    facet.uuid = Some(reg.uuid.clone());
    if reg.user.is_some() {
        facet.user = reg.user.clone();
    }
    facet.activation_keys = reg.activation_keys.iter().map(|key| key.id).collect();
    reg.store.subscription_facets.insert(id, facet);
    Ok(())
}

fn destroy_subscription_facet(reg: &mut Registration<'_>) {
    reg.store.subscription_facets.remove(&reg.host.id);
}

fn initial_subscription_status(reg: &mut Registration<'_>) -> Result<(), RegistrationError> {
    let id = reg.host.id;
    set_subscription_status(reg.store, id, SubscriptionStatus::Unknown)?;
    reg.store.host_mut(id)?.refresh_global_status();
    Ok(())
}

fn create_consumer(reg: &mut Registration<'_>) -> Result<(), RegistrationError> {
    let key_names: Vec<String> = reg.activation_keys.iter().map(|key| key.name.clone()).collect();
    let assigned = reg.provider.create_consumer(
        &reg.content_view_environment.cp_id,
        &reg.params,
        &key_names,
    )?;

    let id = reg.host.id;
    if assigned != reg.uuid {
        tracing::debug!(
            requested = %reg.uuid,
            assigned = %assigned,
            "provider assigned consumer uuid",
        );
        if let Some(facet) = reg.store.subscription_facet_mut(id) {
            facet.uuid = Some(assigned.clone());
        }
        if let Some(facet) = reg.store.content_facet_mut(id) {
            facet.uuid = Some(assigned.clone());
        }
        reg.uuid = assigned;
    }
    if !reg.params.facts.is_empty() {
        reg.store.host_mut(id)?.facts = reg.params.facts.clone();
    }
    Ok(())
}

fn finalize_registration(reg: &mut Registration<'_>) -> Result<(), RegistrationError> {
    let id = reg.host.id;
    let attributes = ConsumerAttributes::from_raw(reg.provider.consumer_attributes(&reg.uuid)?)?;

    let facet = reg
        .store
        .subscription_facet_mut(id)
        .ok_or_else(|| not_found("subscription facet", id))?;
    apply_consumer_attributes(facet, &attributes);
    let subscription =
        SubscriptionStatus::from_entitlement(attributes.entitlement_status.as_deref());
    set_subscription_status(reg.store, id, subscription)?;

    let errata = errata_status(reg.store, id);
    if let Some(facet) = reg.store.content_facet_mut(id) {
        facet.errata_status = errata;
    }

    let host = reg.store.host_mut(id)?;
    host.statuses.insert(HostStatusKind::Errata, errata.to_global());
    host.refresh_global_status();
    reg.host = host.clone();
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Copy the attributes that are present onto the facet.
fn apply_consumer_attributes(facet: &mut SubscriptionFacet, attributes: &ConsumerAttributes) {
    if let Some(release) = &attributes.release_ver {
        facet.release_version = Some(release.clone());
    }
    if let Some(level) = &attributes.service_level {
        facet.service_level = Some(level.clone());
    }
    if let Some(role) = &attributes.role {
        facet.purpose_role = Some(role.clone());
    }
    if let Some(usage) = &attributes.usage {
        facet.purpose_usage = Some(usage.clone());
    }
    if attributes.autoheal.is_some() {
        facet.autoheal = attributes.autoheal;
    }
}

fn set_subscription_status(
    store: &mut LocalStore,
    host: HostId,
    status: SubscriptionStatus,
) -> Result<(), RegistrationError> {
    let facet = store
        .subscription_facet_mut(host)
        .ok_or_else(|| not_found("subscription facet", host))?;
    facet.subscription_status = status;
    store
        .host_mut(host)?
        .statuses
        .insert(HostStatusKind::Subscription, status.to_global());
    Ok(())
}

fn errata_status(store: &LocalStore, host: HostId) -> ErrataStatus {
    let Some(facet) = store.content_facet(host) else {
        return ErrataStatus::Unknown;
    };
    if facet.applicable_errata.is_empty() {
        return ErrataStatus::UpToDate;
    }
    let security = facet
        .applicable_errata
        .iter()
        .any(|id| store.errata.get(id).is_some_and(|e| e.security));
    if security {
        ErrataStatus::SecurityNeeded
    } else {
        ErrataStatus::Needed
    }
}

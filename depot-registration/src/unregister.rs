//! Host unregistration.

use depot_core::{HostId, HostStatusKind, LocalStore, StoreError};

use crate::error::RegistrationError;
use crate::provider::IdentityProvider;

/// What unregistering leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnregisterMode {
    /// Destroy both facets and the host record.
    Destroy,
    /// Destroy the subscription facet and strip the content facet's bindings;
    /// the host record and content facet remain.
    Unregister,
    /// The owning organization is being destroyed: the provider consumer goes
    /// with it, and host records are left to the organization's teardown.
    OrganizationDestroy,
}

/// Tear down a host's registration.
///
/// The provider consumer is destroyed first (except during organization
/// teardown); a failure there is returned before anything local changes. A
/// consumer that is already gone counts as destroyed.
pub fn unregister_host(
    store: &mut LocalStore,
    provider: &dyn IdentityProvider,
    host: HostId,
    mode: UnregisterMode,
) -> Result<(), RegistrationError> {
    if mode != UnregisterMode::OrganizationDestroy {
        if let Some(uuid) = store.subscription_facet(host).and_then(|f| f.uuid.clone()) {
            destroy_consumer(provider, &uuid)?;
        }
    }

    store.subscription_facets.remove(&host);

    match mode {
        UnregisterMode::Unregister => remove_host_artifacts(store, host, true)?,
        UnregisterMode::OrganizationDestroy => {
            store.content_facets.remove(&host);
            remove_host_artifacts(store, host, false)?;
        }
        UnregisterMode::Destroy => {
            store.content_facets.remove(&host);
            destroy_host_record(store, host);
        }
    }
    tracing::info!(host = %host, ?mode, "unregistered host");
    Ok(())
}

/// Strip everything a registration attached to the host: statuses, installed
/// packages, reported facts and, with `clear_content_facet`, the content
/// facet's bindings and identity.
pub fn remove_host_artifacts(
    store: &mut LocalStore,
    host: HostId,
    clear_content_facet: bool,
) -> Result<(), StoreError> {
    if clear_content_facet {
        if let Some(facet) = store.content_facet_mut(host) {
            facet.bound_repositories.clear();
            facet.applicable_errata.clear();
            facet.uuid = None;
        }
    }

    let record = store.host_mut(host)?;
    for kind in HostStatusKind::all() {
        record.statuses.remove(kind);
    }
    record.installed_packages.clear();
    record.facts.clear();
    record.refresh_global_status();
    tracing::debug!(host = %record.name, "removed host artifacts");
    Ok(())
}

/// Remove the host record; a record that is already gone is only logged.
pub(crate) fn destroy_host_record(store: &mut LocalStore, host: HostId) {
    if store.remove_host(host).is_none() {
        tracing::warn!(host = %host, "attempted to destroy host but host is already gone");
    }
}

fn destroy_consumer(provider: &dyn IdentityProvider, uuid: &str) -> Result<(), RegistrationError> {
    match provider.destroy_consumer(uuid) {
        Ok(()) => Ok(()),
        Err(err) if err.is_already_gone() => {
            tracing::warn!(
                consumer = uuid,
                error = %err,
                "consumer already removed from identity provider",
            );
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

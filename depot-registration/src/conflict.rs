//! Conflict detection between a registering host and existing hosts.
//!
//! Checked in this order, before anything is mutated:
//! 1. Organization: candidates outside the target organization (and not
//!    unassigned) are dropped; if none remain, the host belongs elsewhere.
//! 2. Re-registration: a single remaining candidate with the exact hostname is
//!    the re-registration target, subject to the build-mode and hardware
//!    identifier gates.
//! 3. Collision: anything else means the hardware identifier is shared with
//!    other hosts.

use depot_core::{HostId, LocalStore, OrganizationId, Settings};

use crate::error::RegistrationError;
use crate::identity::dmi_uuid_change_allowed;

/// Validate `candidates` (from [`find_existing_hosts`]) for a registration
/// into `organization`.
///
/// Returns the host to re-register, or `None` when there are no candidates and
/// a new host should be created.
///
/// [`find_existing_hosts`]: crate::identity::find_existing_hosts
pub fn validate_hosts(
    store: &LocalStore,
    settings: &Settings,
    candidates: &[HostId],
    organization: OrganizationId,
    host_name: &str,
    dmi_uuid: Option<&str>,
    dmi_uuid_overridden: bool,
) -> Result<Option<HostId>, RegistrationError> {
    if candidates.is_empty() {
        return Ok(None);
    }

    let mut eligible = Vec::with_capacity(candidates.len());
    for id in candidates {
        let host = store.host(*id)?;
        if host.organization.map_or(true, |org| org == organization) {
            eligible.push(host);
        }
    }

    if eligible.is_empty() {
        return Err(RegistrationError::WrongOrganization {
            host_name: host_name.to_string(),
            org_name: store.organization(organization)?.name.clone(),
        });
    }

    if let [host] = eligible.as_slice() {
        if host.name == host_name {
            if !host.build && settings.re_register_build_only {
                return Err(RegistrationError::NotInBuildMode {
                    host_name: host_name.to_string(),
                });
            }

            let current = store
                .subscription_facet(host.id)
                .and_then(|f| f.dmi_uuid.as_deref());
            let changed = current.is_some_and(|current| Some(current) != dmi_uuid);
            if changed && !dmi_uuid_change_allowed(settings, host, dmi_uuid_overridden) {
                return Err(RegistrationError::DmiUuidChanged);
            }

            tracing::debug!(host = %host.name, id = %host.id, "re-registering existing host");
            return Ok(Some(host.id));
        }
    }

    let mut existing: Vec<&str> = eligible
        .iter()
        .filter(|h| h.name != host_name)
        .map(|h| h.name.as_str())
        .collect();
    existing.sort_unstable();
    Err(RegistrationError::DmiUuidCollision {
        uuid: dmi_uuid.unwrap_or_default().to_string(),
        existing: existing.join(", "),
    })
}

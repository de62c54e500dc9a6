//! Content removal from custom repositories.
//!
//! Order of effects:
//! 1. Preconditions (custom repository, default content view, unit type valid
//!    for the repository). Violations leave everything untouched.
//! 2. Clear the repository's sync history on every proxy.
//! 3. Remove the units on the primary backend node. A failure here ends the
//!    operation: nothing is recorded and no follow-up work is planned.
//! 4. Plan the follow-ups (capsule resync, applicability regeneration) and the
//!    independent metadata regeneration sub-plan.
//!
//! Local detachment happens only in [`RemovalPlan::finalize`], which the
//! runtime calls once the whole plan has succeeded.

use serde::{Deserialize, Serialize};

use depot_core::{ContentUnitId, LocalStore, RepositoryId, StoreError};

use crate::backend::ContentBackend;
use crate::capability::capability_for;
use crate::error::{validation, SyncError};
use crate::history;
use crate::plan::{LockSubject, Plan, ResourceLock, Step, Task};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveContentOptions {
    /// Explicit unit type; inferred from the first unit when absent.
    pub content_type: Option<String>,
    pub sync_capsule: bool,
    /// Defaults to whether the repository is metadata-bearing (yum).
    pub generate_applicability: Option<bool>,
}

impl Default for RemoveContentOptions {
    fn default() -> Self {
        Self {
            content_type: None,
            sync_capsule: true,
            generate_applicability: None,
        }
    }
}

/// Inputs recorded after the backend confirmed the removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovedUnits {
    pub repository: RepositoryId,
    pub unit_type: String,
    pub unit_ids: Vec<ContentUnitId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovalPlan {
    pub plan: Plan,
    pub removed: RemovedUnits,
}

impl RemovalPlan {
    /// Detach the removed units from the repository in the local store.
    ///
    /// Units that no longer exist locally are ignored. Returns how many
    /// memberships were dropped.
    pub fn finalize(&self, store: &mut LocalStore) -> Result<usize, StoreError> {
        let mut detached = 0;
        for unit in &self.removed.unit_ids {
            if !store.content_units.contains_key(unit) {
                continue;
            }
            if store.detach_content_unit(*unit, self.removed.repository)? {
                detached += 1;
            }
        }
        tracing::info!(
            repository = %self.removed.repository,
            unit_type = %self.removed.unit_type,
            detached,
            "finalized content removal",
        );
        Ok(detached)
    }
}

/// Remove `units` from `repository` and plan the dependent work.
pub fn plan_remove_content(
    store: &mut LocalStore,
    backend: &dyn ContentBackend,
    repository: RepositoryId,
    units: &[ContentUnitId],
    options: &RemoveContentOptions,
) -> Result<RemovalPlan, SyncError> {
    let repo = store.repository(repository)?.clone();
    if repo.redhat {
        return Err(validation(
            "Cannot remove content from a non-custom repository",
        ));
    }
    if !store.content_view(repo.content_view)?.default {
        return Err(validation(
            "Can only remove content from within the Default Content View",
        ));
    }

    let unit_type = match (&options.content_type, units.first()) {
        (Some(explicit), _) => explicit.clone(),
        (None, Some(first)) => store.content_unit(*first)?.kind.type_name().to_string(),
        (None, None) => return Err(validation("No content units given for removal")),
    };
    let capability = capability_for(repo.content_type);
    if !capability.accepts_unit_type(&unit_type) {
        return Err(validation(format!(
            "Content type {unit_type} is incompatible with repositories of type {}",
            repo.content_type
        )));
    }
    let primary = store
        .primary_proxy()
        .cloned()
        .ok_or_else(|| validation("No primary backend node is registered"))?;
    let generate_applicability = options
        .generate_applicability
        .unwrap_or_else(|| capability.metadata_bearing());

    history::clear_for_repository(store, repo.id);

    if let Err(err) = backend.remove_units(&repo, &primary, units, &unit_type) {
        tracing::warn!(repository = %repo.id, error = %err, "unit removal failed; aborting");
        return Err(err.into());
    }

    let removed = RemovedUnits {
        repository: repo.id,
        unit_type,
        unit_ids: units.to_vec(),
    };

    let mut follow_ups = Vec::new();
    if options.sync_capsule {
        follow_ups.push(Step::Task(Task::CapsuleSync {
            repository: repo.id,
        }));
    }
    if generate_applicability {
        follow_ups.push(Step::Task(Task::RegenerateApplicability {
            repositories: vec![repo.id],
        }));
    }

    let lock = ResourceLock::link(LockSubject::Repository(repo.id));
    let mut plan = Plan::new("Remove Content", lock, Step::Sequence(follow_ups));
    plan.sub_plans.push(Plan::new(
        "Generate repository metadata",
        lock,
        Step::Task(Task::MetadataGenerate {
            repository: repo.id,
        }),
    ));

    tracing::info!(
        repository = %repo.id,
        unit_type = %removed.unit_type,
        units = removed.unit_ids.len(),
        "removed units on primary; planned follow-ups",
    );
    Ok(RemovalPlan { plan, removed })
}

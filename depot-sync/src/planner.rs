//! Capsule sync planning.
//!
//! Selection rules:
//! 1. A single repository is planned when `skip_metadata_check` is set or it
//!    has never finished a sync on the proxy; otherwise nothing is planned.
//! 2. Without a repository, every repository available to the proxy for the
//!    (environment, content view) scope is a candidate, heaviest first.
//!    `skip_metadata_check` clears the proxy's history for all candidates;
//!    otherwise repositories already synced to the proxy are dropped.
//!
//! The selected repositories are planned in batches. Each batch is a sequence
//! of two concurrences: the repository syncs, then the boot-file fetches that
//! depend on them. Batches run strictly one after another.

use std::collections::BTreeSet;

use depot_core::{
    ContentViewId, EnvironmentId, LocalStore, Proxy, ProxyId, Repository, RepositoryId, Settings,
};

use crate::capability::capability_for;
use crate::error::{validation, SyncError};
use crate::history;
use crate::plan::{LockSubject, Plan, RescueStrategy, ResourceLock, Step, Task};

/// Scope of a capsule sync.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    pub environment: Option<EnvironmentId>,
    pub content_view: Option<ContentViewId>,
    pub repository: Option<RepositoryId>,
    pub skip_metadata_check: bool,
}

/// Build the sync plan for `proxy`.
///
/// Clears sync history when `skip_metadata_check` forces a full re-check; no
/// other state is touched.
pub fn plan_capsule_sync(
    store: &mut LocalStore,
    settings: &Settings,
    proxy: ProxyId,
    options: &SyncOptions,
) -> Result<Plan, SyncError> {
    let proxy = store.proxy(proxy)?.clone();
    let batch_size = proxy.batch_size.unwrap_or(settings.batch_size);
    if batch_size == 0 {
        return Err(validation("batch size must be at least 1"));
    }

    let repositories = repos_to_sync(store, &proxy, options)?;
    let mut batches = Vec::new();
    for batch in repositories.chunks(batch_size) {
        let syncs = batch
            .iter()
            .map(|repo| {
                let capability = capability_for(repo.content_type);
                Step::Task(capability.sync_task(repo, proxy.id, options.skip_metadata_check))
            })
            .collect();
        let boot_files = batch
            .iter()
            .filter(|repo| capability_for(repo.content_type).fetches_boot_files(repo))
            .map(|repo| {
                Step::Task(Task::FetchBootFiles {
                    repository: repo.id,
                    proxy: proxy.id,
                })
            })
            .collect();
        batches.push(Step::Sequence(vec![
            Step::Concurrence(syncs),
            Step::Concurrence(boot_files),
        ]));
    }

    tracing::info!(
        proxy = %proxy.id,
        repositories = repositories.len(),
        batches = batches.len(),
        batch_size,
        "planned capsule sync",
    );

    let mut plan = Plan::new(
        "Synchronize capsule content",
        ResourceLock::link(LockSubject::Proxy(proxy.id)),
        Step::Sequence(batches),
    );
    plan.rescue = RescueStrategy::Skip;
    plan.run = Some(Task::SyncContainerGateway { proxy: proxy.id });
    Ok(plan)
}

/// Repositories that need syncing to `proxy`, in planning order.
pub fn repos_to_sync(
    store: &mut LocalStore,
    proxy: &Proxy,
    options: &SyncOptions,
) -> Result<Vec<Repository>, SyncError> {
    lifecycle_environment_check(store, proxy, options)?;

    if let Some(repository) = options.repository {
        let repo = store.repository(repository)?.clone();
        if options.skip_metadata_check || !history::is_synced(store, repo.id, proxy.id) {
            return Ok(vec![repo]);
        }
        tracing::debug!(repository = %repo.id, proxy = %proxy.id, "already synced; skipping");
        return Ok(Vec::new());
    }

    let candidates = repositories_available_to_proxy(
        store,
        proxy,
        options.environment,
        options.content_view,
    );

    if options.skip_metadata_check {
        let ids: Vec<_> = candidates.iter().map(|r| r.id).collect();
        history::clear_for_proxy(store, proxy.id, &ids);
        return Ok(candidates);
    }

    let synced = history::synced_on_proxy(store, proxy.id);
    Ok(candidates
        .into_iter()
        .filter(|repo| {
            let skip = synced.contains(&repo.id);
            if skip {
                tracing::debug!(
                    repository = %repo.id,
                    proxy = %proxy.id,
                    "already synced; skipping",
                );
            }
            !skip
        })
        .collect())
}

/// Repositories in the proxy's lifecycle environments, narrowed to the given
/// environment and content view, ordered by descending package count.
fn repositories_available_to_proxy(
    store: &LocalStore,
    proxy: &Proxy,
    environment: Option<EnvironmentId>,
    content_view: Option<ContentViewId>,
) -> Vec<Repository> {
    let environments: BTreeSet<EnvironmentId> = match environment {
        Some(env) => BTreeSet::from([env]),
        None => proxy.lifecycle_environments.clone(),
    };
    let mut repos: Vec<Repository> = store
        .repositories
        .values()
        .filter(|r| r.environment.is_some_and(|env| environments.contains(&env)))
        .filter(|r| content_view.map_or(true, |cv| r.content_view == cv))
        .cloned()
        .collect();
    repos.sort_by(|a, b| {
        b.package_count
            .cmp(&a.package_count)
            .then_with(|| a.id.cmp(&b.id))
    });
    repos
}

/// The requested environment (or the repository's own environment) must be
/// attached to the proxy.
fn lifecycle_environment_check(
    store: &LocalStore,
    proxy: &Proxy,
    options: &SyncOptions,
) -> Result<(), SyncError> {
    let environment = match options.repository {
        Some(repository) => store.repository(repository)?.environment,
        None => options.environment,
    };
    let Some(environment) = environment else {
        return Ok(());
    };
    if proxy.lifecycle_environments.contains(&environment) {
        return Ok(());
    }
    let name = store
        .environment(environment)
        .map(|env| env.name.clone())
        .unwrap_or_else(|_| environment.to_string());
    Err(validation(format!(
        "Lifecycle environment '{name}' is not attached to capsule '{}'.",
        proxy.name
    )))
}

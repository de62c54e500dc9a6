//! Sync history: per (repository, proxy) record of completed capsule syncs.
//!
//! A row with a non-null `finished_at` marks the repository as previously
//! synced to that proxy, which lets the planner skip it. Rows are upserted per
//! pair, so concurrent tasks for different repositories never collide.

use std::collections::BTreeSet;

use chrono::Utc;

use depot_core::{LocalStore, ProxyId, RepositoryId, SyncHistoryEntry};

/// Whether `repository` has a completed sync on `proxy`.
pub fn is_synced(store: &LocalStore, repository: RepositoryId, proxy: ProxyId) -> bool {
    store
        .sync_history_entry(repository, proxy)
        .is_some_and(|e| e.finished_at.is_some())
}

/// Repositories with a completed sync on `proxy`.
pub fn synced_on_proxy(store: &LocalStore, proxy: ProxyId) -> BTreeSet<RepositoryId> {
    store
        .sync_history
        .iter()
        .filter(|e| e.proxy == proxy && e.finished_at.is_some())
        .map(|e| e.repository)
        .collect()
}

/// Forget `proxy`'s history for the given repositories.
pub fn clear_for_proxy(
    store: &mut LocalStore,
    proxy: ProxyId,
    repositories: &[RepositoryId],
) -> usize {
    let targets: BTreeSet<_> = repositories.iter().copied().collect();
    let removed =
        store.remove_sync_history_where(|e| e.proxy == proxy && targets.contains(&e.repository));
    tracing::debug!(proxy = %proxy, removed, "cleared capsule sync history");
    removed
}

/// Forget the repository's history on every proxy.
pub fn clear_for_repository(store: &mut LocalStore, repository: RepositoryId) -> usize {
    let removed = store.remove_sync_history_where(|e| e.repository == repository);
    tracing::debug!(repository = %repository, removed, "cleared repository sync history");
    removed
}

/// Runtime callback: a repository sync task started on `proxy`.
pub fn record_started(store: &mut LocalStore, repository: RepositoryId, proxy: ProxyId) {
    store.upsert_sync_history(SyncHistoryEntry {
        repository,
        proxy,
        started_at: Utc::now(),
        finished_at: None,
    });
}

/// Runtime callback: a repository sync task finished successfully on `proxy`.
pub fn record_finished(store: &mut LocalStore, repository: RepositoryId, proxy: ProxyId) {
    let now = Utc::now();
    let started_at = store
        .sync_history_entry(repository, proxy)
        .map(|e| e.started_at)
        .unwrap_or(now);
    store.upsert_sync_history(SyncHistoryEntry {
        repository,
        proxy,
        started_at,
        finished_at: Some(now),
    });
}

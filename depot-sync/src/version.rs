//! Repository version bookkeeping after a backend change.
//!
//! Version reference resolution, first match wins:
//! 1. `force_fetch_version`: read it live from the backend
//! 2. pre-fetched repository details
//! 3. finished task outputs (first `/versions/` resource)
//! 4. read it live from the backend
//!
//! Task outputs additionally supply the publication reference when one of
//! them created a `/publications/` resource.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use depot_core::{LocalStore, RepositoryId};

use crate::backend::{created_resource, ContentBackend, RepositoryDetails, TaskOutput};
use crate::error::{validation, SyncError};

const VERSION_MARKER: &str = "/versions/";
const PUBLICATION_MARKER: &str = "/publications/";

/// Recorded inputs of a version save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveVersion {
    pub repository: RepositoryId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<RepositoryDetails>,
    #[serde(default)]
    pub force_fetch_version: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveVersionOutput {
    pub contents_changed: bool,
    pub publication_provided: bool,
}

impl SaveVersion {
    /// Record the inputs. Task outputs and details are mutually exclusive; an
    /// empty task list counts as no tasks.
    pub fn new(
        repository: RepositoryId,
        tasks: Option<Vec<TaskOutput>>,
        details: Option<RepositoryDetails>,
        force_fetch_version: bool,
    ) -> Result<Self, SyncError> {
        let tasks = tasks.unwrap_or_default();
        if !tasks.is_empty() && details.is_some() {
            return Err(validation(
                "Cannot accept tasks and repository_details into Save Version.",
            ));
        }
        Ok(Self {
            repository,
            tasks,
            details,
            force_fetch_version,
        })
    }

    /// Reconcile the repository's stored references with the backend.
    pub fn run(
        &self,
        store: &mut LocalStore,
        backend: &dyn ContentBackend,
    ) -> Result<SaveVersionOutput, SyncError> {
        let version_href = self.resolve_version_href(store, backend)?;
        let publication_href =
            created_resource(&self.tasks, PUBLICATION_MARKER).map(str::to_string);

        let repo = store.repository_mut(self.repository)?;
        let mut output = SaveVersionOutput::default();

        if let Some(href) = publication_href {
            repo.publication_href = Some(href);
            output.publication_provided = true;
        }

        if let Some(href) = version_href {
            if self.force_fetch_version || repo.version_href.as_deref() != Some(href.as_str()) {
                repo.version_href = Some(href);
                repo.last_contents_changed = Some(Utc::now());
                output.contents_changed = true;
            }
        }

        tracing::info!(
            repository = %self.repository,
            contents_changed = output.contents_changed,
            publication_provided = output.publication_provided,
            "saved repository version",
        );
        Ok(output)
    }

    fn resolve_version_href(
        &self,
        store: &LocalStore,
        backend: &dyn ContentBackend,
    ) -> Result<Option<String>, SyncError> {
        if !self.force_fetch_version {
            if let Some(details) = &self.details {
                return Ok(details.latest_version_href.clone());
            }
            if !self.tasks.is_empty() {
                return Ok(created_resource(&self.tasks, VERSION_MARKER).map(str::to_string));
            }
        }
        let repo = store.repository(self.repository)?;
        tracing::debug!(repository = %repo.id, "fetching latest version from backend");
        Ok(backend.read_latest_version(repo)?)
    }
}

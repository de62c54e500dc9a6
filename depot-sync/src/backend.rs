//! Interface to the backend content service.

use serde::{Deserialize, Serialize};

use depot_core::{ContentUnitId, Proxy, Repository};

use crate::error::BackendError;

/// Output of a finished backend task, as reported by the runtime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    #[serde(default)]
    pub created_resources: Vec<String>,
}

/// First resource reference across `tasks` containing `marker`.
pub(crate) fn created_resource<'a>(tasks: &'a [TaskOutput], marker: &str) -> Option<&'a str> {
    tasks
        .iter()
        .flat_map(|t| t.created_resources.iter())
        .find(|href| href.contains(marker))
        .map(String::as_str)
}

/// Pre-fetched repository details snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDetails {
    #[serde(default)]
    pub latest_version_href: Option<String>,
}

/// The backend content service. Implementations talk to the primary node.
pub trait ContentBackend {
    /// Current version reference of the repository, if it has one.
    fn read_latest_version(&self, repository: &Repository) -> Result<Option<String>, BackendError>;

    /// Remove units of `unit_type` from the repository on `primary`.
    fn remove_units(
        &self,
        repository: &Repository,
        primary: &Proxy,
        unit_ids: &[ContentUnitId],
        unit_type: &str,
    ) -> Result<(), BackendError>;
}

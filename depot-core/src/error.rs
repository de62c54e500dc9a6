//! Error types for depot-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from store and settings operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, with the path that was being touched.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; `~/.depot/` cannot be located.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The store YAML file did not exist at the expected path.
    #[error("store not found at {path}")]
    StoreNotFound { path: PathBuf },

    /// A record lookup by id found nothing.
    #[error("{kind} {id} not found")]
    RecordNotFound { kind: &'static str, id: u64 },

    /// A setting was present but outside its accepted range.
    #[error("invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`StoreError::RecordNotFound`].
pub fn not_found(kind: &'static str, id: impl Into<u64>) -> StoreError {
    StoreError::RecordNotFound {
        kind,
        id: id.into(),
    }
}

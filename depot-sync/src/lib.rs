//! # depot-sync
//!
//! Capsule sync planning, content removal, and repository version bookkeeping.
//!
//! Nothing in this crate executes backend work directly except the two calls
//! its orchestrators are defined by (removing units, reading the latest
//! version). Everything else is returned as a [`Plan`] for an external
//! runtime to execute.

pub mod backend;
pub mod capability;
pub mod error;
pub mod history;
pub mod plan;
pub mod planner;
pub mod removal;
pub mod version;

pub use backend::{ContentBackend, RepositoryDetails, TaskOutput};
pub use capability::{capability_for, SyncCapability};
pub use error::{BackendError, SyncError};
pub use plan::{LockKind, LockSubject, Plan, RescueStrategy, ResourceLock, Step, Task};
pub use planner::{plan_capsule_sync, repos_to_sync, SyncOptions};
pub use removal::{plan_remove_content, RemovalPlan, RemoveContentOptions, RemovedUnits};
pub use version::{SaveVersion, SaveVersionOutput};

//! Declarative execution plans handed to the orchestration runtime.
//!
//! A [`Plan`] is data: ordered [`Step`]s that are either a single [`Task`], a
//! sequence (children run one after another, each waiting for the previous to
//! finish) or a concurrence (children run in parallel, no relative order).
//! The runtime executes it, tracks per-task success, and honours the plan's
//! lock and rescue strategy.

use serde::{Deserialize, Serialize};

use depot_core::{ProxyId, RepositoryId};

/// A single unit of work for the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum Task {
    /// Sync one repository to a proxy through its content-type backend.
    SyncRepository {
        repository: RepositoryId,
        proxy: ProxyId,
        backend: String,
        skip_metadata_check: bool,
    },
    /// Fetch kickstart boot files for an on-demand bootable repository.
    FetchBootFiles {
        repository: RepositoryId,
        proxy: ProxyId,
    },
    /// Refresh the proxy's container gateway once its repositories are synced.
    SyncContainerGateway { proxy: ProxyId },
    /// Resync every capsule carrying the repository.
    CapsuleSync { repository: RepositoryId },
    /// Regenerate errata applicability for hosts bound to the repositories.
    RegenerateApplicability { repositories: Vec<RepositoryId> },
    /// Regenerate and publish repository metadata.
    MetadataGenerate { repository: RepositoryId },
}

/// Shape of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Task(Task),
    Sequence(Vec<Step>),
    Concurrence(Vec<Step>),
}

impl Step {
    /// Every task in the step, depth first, in declaration order.
    pub fn tasks(&self) -> Vec<&Task> {
        let mut out = Vec::new();
        self.collect_tasks(&mut out);
        out
    }

    fn collect_tasks<'a>(&'a self, out: &mut Vec<&'a Task>) {
        match self {
            Step::Task(task) => out.push(task),
            Step::Sequence(steps) | Step::Concurrence(steps) => {
                for step in steps {
                    step.collect_tasks(out);
                }
            }
        }
    }

    /// Children of a sequence or concurrence; empty for a single task.
    pub fn children(&self) -> &[Step] {
        match self {
            Step::Task(_) => &[],
            Step::Sequence(steps) | Step::Concurrence(steps) => steps,
        }
    }
}

/// What the runtime should do when the plan's own action fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RescueStrategy {
    /// Fail the enclosing chain.
    #[default]
    Abort,
    /// Mark the action skipped and let the enclosing chain continue.
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    /// Exclusive against other plans linking the same subject, but readable.
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum LockSubject {
    Proxy(ProxyId),
    Repository(RepositoryId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    pub kind: LockKind,
    pub subject: LockSubject,
}

impl ResourceLock {
    pub fn link(subject: LockSubject) -> Self {
        Self {
            kind: LockKind::Link,
            subject,
        }
    }
}

/// A complete plan for the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub label: String,
    pub lock: ResourceLock,
    #[serde(default)]
    pub rescue: RescueStrategy,
    pub root: Step,
    /// The plan's own action, run by the runtime after `root` completes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<Task>,
    /// Plans triggered independently; their failure does not fail this plan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_plans: Vec<Plan>,
}

impl Plan {
    pub fn new(label: impl Into<String>, lock: ResourceLock, root: Step) -> Self {
        Self {
            label: label.into(),
            lock,
            rescue: RescueStrategy::default(),
            root,
            run: None,
            sub_plans: Vec::new(),
        }
    }

    /// Tasks of `root`, excluding `run` and sub-plans.
    pub fn tasks(&self) -> Vec<&Task> {
        self.root.tasks()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

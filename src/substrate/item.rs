use std::fmt;
use std::sync::Arc;

/// Opaque work-item identifier, issued monotonically by the substrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkItemId(pub u64);

impl fmt::Display for WorkItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for WorkItemId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Kind of the job that owns a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Classic project; always subject to drain admission.
    Project,
    /// Any other job kind (pipelines, matrix parents, ...); subject to drain
    /// admission only when `allow_all_job_kinds` is set.
    Job,
    /// Not a job at all (maintenance or one-off tasks); never blocked.
    Task,
}

/// Reference to the job owning a work item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobRef {
    /// Full job name, matched against the whitelist.
    pub name: Arc<str>,
    /// Job kind.
    pub kind: JobKind,
}

impl JobRef {
    /// Creates a classic project reference.
    pub fn project(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            kind: JobKind::Project,
        }
    }

    /// Creates a reference of the given kind.
    pub fn new(name: impl Into<Arc<str>>, kind: JobKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A reference from an item to the item whose run triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpstreamCause {
    /// Work item that produced the triggering run.
    pub producing: WorkItemId,
}

/// Scheduling phase of a pending item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemPhase {
    /// Still in its quiet period; cannot be given a full placement test.
    Settling,
    /// Ready to be placed on a worker.
    #[default]
    Buildable,
}

/// A pending unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    /// Identifier.
    pub id: WorkItemId,
    /// Owning job.
    pub job: JobRef,
    /// Upstream causes; empty for user- or timer-triggered items.
    pub causes: Vec<UpstreamCause>,
    /// Settling or buildable.
    pub phase: ItemPhase,
    /// Reason the substrate currently reports the item as blocked, if any.
    pub blocked: Option<Arc<str>>,
}

impl WorkItem {
    /// Creates a buildable, unblocked item with no upstream causes.
    pub fn new(id: impl Into<WorkItemId>, job: JobRef) -> Self {
        Self {
            id: id.into(),
            job,
            causes: Vec::new(),
            phase: ItemPhase::Buildable,
            blocked: None,
        }
    }

    /// Adds an upstream cause.
    #[must_use]
    pub fn caused_by(mut self, producing: impl Into<WorkItemId>) -> Self {
        self.causes.push(UpstreamCause {
            producing: producing.into(),
        });
        self
    }

    /// Sets the scheduling phase.
    #[must_use]
    pub fn with_phase(mut self, phase: ItemPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Returns true while the item is in its quiet period.
    #[inline]
    pub fn is_settling(&self) -> bool {
        matches!(self.phase, ItemPhase::Settling)
    }
}

/// A live run record, resolved from an [`UpstreamCause`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    /// Work item the run was started from.
    pub work_item: WorkItemId,
    /// Whether the run is still executing.
    pub running: bool,
    /// Worker the run executed on.
    pub built_on: Arc<str>,
}

//! # Substrate: the job/queue/worker system this crate only reads.
//!
//! The drain runtime never creates, runs or places work itself. It consumes a
//! narrow view of the substrate through the [`Substrate`] trait:
//! - [`WorkItem`] pending items with their upstream causes
//! - [`RunRecord`] live run records for resolving causes
//! - [`WorkerInfo`] workers with status and running items
//! - a placement test and an offline transition per worker
//!
//! All methods are synchronous: admission checks never suspend. Implementations
//! should answer from in-memory state and avoid blocking I/O.

mod item;
mod worker;

pub use item::{ItemPhase, JobKind, JobRef, RunRecord, UpstreamCause, WorkItem, WorkItemId};
pub use worker::{OfflineCause, Placement, UserRef, WorkerInfo, WorkerStatus};

use crate::error::SubstrateError;

/// Read-mostly view of the execution substrate.
///
/// ### Contract
/// - `pending_items` returns the queue as it is *now*; items may disappear
///   between calls (cancelled, started). Unknown identifiers are not an error.
/// - `run_record` returns `None` once a run has been garbage-collected.
/// - `can_place` must be side-effect free.
pub trait Substrate: Send + Sync + 'static {
    /// Snapshot of every pending (queued, not yet running) item.
    fn pending_items(&self) -> Vec<WorkItem>;

    /// Live run record for the run that was started from work item `id`.
    fn run_record(&self, id: WorkItemId) -> Option<RunRecord>;

    /// Snapshot of every known worker.
    fn workers(&self) -> Vec<WorkerInfo>;

    /// Looks up a single worker by name.
    fn worker(&self, name: &str) -> Option<WorkerInfo> {
        self.workers().into_iter().find(|w| &*w.name == name)
    }

    /// Placement test: could `worker` take `item` right now?
    fn can_place(&self, worker: &str, item: &WorkItem) -> Result<Placement, SubstrateError>;

    /// Marks `worker` temporarily offline with the given cause.
    fn take_offline(&self, worker: &str, cause: OfflineCause) -> Result<(), SubstrateError>;
}

//! # Substrate-facing hooks.
//!
//! The substrate's adapter layer calls these from its own threads: admission
//! checks from the scheduling loop, completions and worker-online notifications
//! from its listeners. Every method is synchronous and returns without waiting
//! on background work.

use crate::admission::Admission;
use crate::substrate::{WorkItem, WorkItemId};

/// Entry points the substrate invokes.
pub trait DrainHooks: Send + Sync {
    /// Global admission check, once per pending item per scheduling pass.
    fn on_admission_check(&self, item: &WorkItem) -> Admission;

    /// Per-worker admission check, once per (item, candidate worker) pair.
    fn on_worker_admission_check(&self, item: &WorkItem, worker: &str) -> Admission;

    /// A work item finished on `worker`.
    fn on_completion(&self, item: WorkItemId, worker: &str);

    /// `worker` came (back) online by operator action or reconnection.
    fn on_worker_online(&self, worker: &str);
}

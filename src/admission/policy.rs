//! # Admission policy.
//!
//! Two checks, both synchronous and never waiting on the snapshot analysis:
//!
//! ```text
//! check(item)                              check_on_worker(item, worker)
//! ───────────                              ─────────────────────────────
//! drain off?            → Inactive         worker not draining?   → Inactive
//! kind not applicable?  → NotApplicable    kind not applicable?   → NotApplicable
//! own id permitted?     → Preexisting      own id permitted?      → Preexisting
//! upstream permitted?   → Upstream         can run elsewhere?     → NodeShutdown
//! whitelisted?          → Whitelisted      upstream permitted?    → Upstream
//! otherwise             → GlobalShutdown   otherwise              → NodeShutdown
//! ```
//!
//! The global check asks "is this a legitimate continuation at all"; the worker
//! check asks "can it go somewhere else", so a draining worker sheds every
//! item another worker can take and keeps only work pinned to it.
//!
//! Upstream lineage is resolved before the state lock is taken; the lock is held
//! only for the set tests and inserts. Until the analysis finishes, the name
//! whitelist is not consulted and the permitted set may still be partial, so
//! checks in that window are conservative.

use std::sync::Arc;

use tracing::debug;

use super::decision::{Admission, Blockage, Grant};
use crate::causality::CausalityResolver;
use crate::config::ShutdownConfiguration;
use crate::state::{ShutdownState, WorkerStates};
use crate::substrate::WorkItem;

/// Decides whether a pending item may run under the current drains.
#[derive(Clone)]
pub struct AdmissionPolicy {
    config: Arc<ShutdownConfiguration>,
    resolver: CausalityResolver,
    global: Arc<ShutdownState>,
    workers: Arc<WorkerStates>,
}

impl AdmissionPolicy {
    pub fn new(
        config: Arc<ShutdownConfiguration>,
        resolver: CausalityResolver,
        global: Arc<ShutdownState>,
        workers: Arc<WorkerStates>,
    ) -> Self {
        Self {
            config,
            resolver,
            global,
            workers,
        }
    }

    /// Global check, once per pending item per scheduling pass.
    pub fn check(&self, item: &WorkItem) -> Admission {
        if !self.global.is_active() {
            return Admission::Allow(Grant::Inactive);
        }
        if !self.config.is_applicable(&item.job) {
            let mut inner = self.global.lock();
            if inner.active {
                inner.permit(item.id, true);
            }
            return Admission::Allow(Grant::NotApplicable);
        }

        let upstream = self.resolver.upstream_ids(item);
        let whitelisted_name = self.config.is_whitelisted(&item.job.name);

        let mut inner = self.global.lock();
        if !inner.active {
            return Admission::Allow(Grant::Inactive);
        }
        let grant = if inner.permitted.contains(&item.id) {
            Grant::Preexisting
        } else if upstream.iter().any(|id| inner.permitted.contains(id)) {
            Grant::Upstream
        } else if (!inner.analyzing && whitelisted_name)
            || upstream.iter().any(|id| inner.whitelisted.contains(id))
        {
            inner.whitelisted.insert(item.id);
            Grant::Whitelisted
        } else {
            drop(inner);
            debug!(item = %item.id, job = %item.job.name, "blocked by global drain");
            return Admission::Block(Blockage::GlobalShutdown {
                message: self.config.message().into(),
            });
        };
        inner.permit(item.id, grant != Grant::Whitelisted);
        Admission::Allow(grant)
    }

    /// Per-worker check, once per (item, candidate worker) pair during placement.
    pub fn check_on_worker(&self, item: &WorkItem, worker: &str) -> Admission {
        let Some(ws) = self.workers.get(worker) else {
            return Admission::Allow(Grant::Inactive);
        };
        if !ws.is_active() {
            return Admission::Allow(Grant::Inactive);
        }
        if !self.config.is_applicable(&item.job) {
            let mut inner = ws.lock();
            if inner.phase.is_draining() {
                inner.permitted.insert(item.id);
            }
            return Admission::Allow(Grant::NotApplicable);
        }
        if ws.is_permitted(item.id) {
            return Admission::Allow(Grant::Preexisting);
        }

        let blocked = || {
            debug!(item = %item.id, worker, "blocked by worker drain");
            Admission::Block(Blockage::NodeShutdown {
                worker: ws.name().clone(),
            })
        };
        if self.resolver.other_worker_can_run(item, worker) {
            return blocked();
        }

        let upstream = self.resolver.upstream_ids(item);
        let mut inner = ws.lock();
        if !inner.phase.is_draining() {
            return Admission::Allow(Grant::Inactive);
        }
        if upstream.iter().any(|id| inner.permitted.contains(id)) {
            inner.permitted.insert(item.id);
            return Admission::Allow(Grant::Upstream);
        }
        drop(inner);
        blocked()
    }
}

//! # Causality resolution over the substrate.
//!
//! [`CausalityResolver`] answers the questions admission and analysis ask about
//! the causal graph and about worker placement:
//!
//! ```text
//! WorkItem.causes ──► run_record(producing) ──► RunRecord { running, built_on }
//!                        │
//!                        └─ None (garbage-collected) → omitted, fails open
//! ```
//!
//! ## Rules
//! - Only one level of causes is walked (the item's direct upstream).
//! - A placement test that errors counts as "this worker cannot take it":
//!   the item stays pinned to the draining worker rather than being evacuated
//!   on a guess.
//! - Unknown workers or items are "no information", never an error.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{trace, warn};

use crate::error::DrainError;
use crate::substrate::{RunRecord, Substrate, WorkItem, WorkItemId};

/// Resolves upstream lineage and placement alternatives for pending items.
#[derive(Clone)]
pub struct CausalityResolver {
    substrate: Arc<dyn Substrate>,
}

impl CausalityResolver {
    pub fn new(substrate: Arc<dyn Substrate>) -> Self {
        Self { substrate }
    }

    pub fn substrate(&self) -> &Arc<dyn Substrate> {
        &self.substrate
    }

    /// Live run records of the item's direct upstream, deduplicated.
    pub fn upstream_runs(&self, item: &WorkItem) -> Vec<RunRecord> {
        let mut seen = HashSet::with_capacity(item.causes.len());
        item.causes
            .iter()
            .filter(|cause| seen.insert(cause.producing))
            .filter_map(|cause| self.substrate.run_record(cause.producing))
            .collect()
    }

    /// Identifiers of the work items whose runs directly caused `item`.
    pub fn upstream_ids(&self, item: &WorkItem) -> HashSet<WorkItemId> {
        self.upstream_runs(item)
            .into_iter()
            .map(|run| run.work_item)
            .collect()
    }

    /// True when at least one live upstream run has finished.
    pub fn has_finished_upstream(&self, item: &WorkItem) -> bool {
        self.upstream_runs(item).iter().any(|run| !run.running)
    }

    /// Identifiers currently running on `worker`, or on every worker when `None`.
    pub fn running_ids(&self, worker: Option<&str>) -> HashSet<WorkItemId> {
        match worker {
            Some(name) => self
                .substrate
                .worker(name)
                .map(|w| w.running.into_iter().collect())
                .unwrap_or_default(),
            None => self
                .substrate
                .workers()
                .into_iter()
                .flat_map(|w| w.running)
                .collect(),
        }
    }

    /// True when `worker` has at least one busy executor.
    pub fn is_busy(&self, worker: &str) -> bool {
        self.substrate
            .worker(worker)
            .is_some_and(|w| w.is_busy())
    }

    /// Can a worker other than `excluding` run `item`?
    ///
    /// - Buildable items get a full placement test on every other online worker.
    /// - Settling items cannot be placement-tested; another worker is assumed to
    ///   be able to take them unless every live upstream run finished on
    ///   `excluding`.
    pub fn other_worker_can_run(&self, item: &WorkItem, excluding: &str) -> bool {
        if item.is_settling() {
            let upstream = self.upstream_runs(item);
            let pinned = !upstream.is_empty()
                && upstream
                    .iter()
                    .all(|run| !run.running && &*run.built_on == excluding);
            return !pinned;
        }

        self.substrate
            .workers()
            .into_iter()
            .filter(|w| w.is_online() && &*w.name != excluding)
            .any(|w| match self.substrate.can_place(&w.name, item) {
                Ok(placement) => placement.is_allowed(),
                Err(source) => {
                    let err = DrainError::PlacementQuery {
                        worker: w.name.clone(),
                        item: item.id,
                        source,
                    };
                    warn!(label = err.as_label(), error = %err, "placement test failed; treating as unable");
                    false
                }
            })
    }

    /// True if some pending item can only run on `worker`.
    ///
    /// A worker with exclusive work must stay draining instead of going offline.
    pub fn has_exclusive_work(&self, worker: &str) -> bool {
        let exclusive = self
            .substrate
            .pending_items()
            .iter()
            .find(|item| !self.other_worker_can_run(item, worker))
            .map(|item| item.id);
        if let Some(id) = exclusive {
            trace!(worker, item = %id, "worker holds exclusive pending work");
        }
        exclusive.is_some()
    }
}

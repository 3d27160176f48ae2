//! # Snapshot analysis.
//!
//! When a drain activates, [`SnapshotAnalyzer`] decides which of the work that
//! already exists may still run: queued continuations of earlier work, items
//! already running, and (globally) items of whitelisted projects.
//!
//! ## Flow
//! ```text
//! activate() ──► spawn_global(state, epoch)
//!                  │
//!                  ├─► publish AnalysisStarted
//!                  ├─► spawn_blocking ─► FinishGuard ─► analyze_global()
//!                  │                         │  phase 1: queued   ─► publish(epoch)
//!                  │                         │  phase 2: running  ─► publish(epoch)
//!                  │                         │  phase 3: whitelist─► publish(epoch)
//!                  │                         └─ drop: finish_analysis(epoch)  (also on panic)
//!                  │
//!                  └─► join task ─► Ok  ─► AnalysisCompleted{count}
//!                                  └─ Err ─► AnalysisFailure (warn!) ─► AnalysisFailed
//! ```
//!
//! ## Rules
//! - The caller never waits; it observes completion through `is_analyzing()` or
//!   `wait_analysis()`.
//! - Each phase is published separately and only while its epoch is current,
//!   so a failure keeps earlier phases and a stale run publishes nothing.
//! - Whitelisted items are recorded only when neither they nor their upstream
//!   were already permitted.
//! - A queued item is accepted when its job kind is not subject to the drain,
//!   when all queued items are allowed, or when one of its upstream runs has
//!   already finished. Items with no upstream are new chains and are excluded.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::causality::CausalityResolver;
use crate::config::{ShutdownConfiguration, ShutdownSettings};
use crate::error::{DrainError, Scope};
use crate::events::{Bus, Event, EventKind};
use crate::state::{ShutdownState, WorkerShutdownState};
use crate::subscribers::panic_message;
use crate::substrate::{WorkItem, WorkItemId};

/// State an analysis publishes into.
#[derive(Clone)]
enum Target {
    Global(Arc<ShutdownState>),
    Worker(Arc<WorkerShutdownState>),
}

impl Target {
    fn scope(&self) -> Scope {
        match self {
            Target::Global(_) => Scope::Global,
            Target::Worker(ws) => Scope::Worker(ws.name().clone()),
        }
    }

    fn worker(&self) -> Option<Arc<str>> {
        match self {
            Target::Global(_) => None,
            Target::Worker(ws) => Some(ws.name().clone()),
        }
    }

    fn finish(&self, epoch: u64) -> bool {
        match self {
            Target::Global(state) => state.finish_analysis(epoch),
            Target::Worker(ws) => ws.finish_analysis(epoch),
        }
    }
}

/// Clears the `analyzing` flag when the analysis returns or unwinds.
struct FinishGuard {
    target: Target,
    epoch: u64,
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.target.finish(self.epoch);
    }
}

/// Computes the permitted sets for a freshly activated drain.
#[derive(Clone)]
pub struct SnapshotAnalyzer {
    resolver: CausalityResolver,
    config: Arc<ShutdownConfiguration>,
    bus: Bus,
    runtime: Handle,
}

impl SnapshotAnalyzer {
    pub fn new(
        resolver: CausalityResolver,
        config: Arc<ShutdownConfiguration>,
        bus: Bus,
        runtime: Handle,
    ) -> Self {
        Self {
            resolver,
            config,
            bus,
            runtime,
        }
    }

    /// Starts the global analysis for `epoch` in the background.
    pub fn spawn_global(&self, state: Arc<ShutdownState>, epoch: u64) -> JoinHandle<()> {
        self.spawn(Target::Global(state), epoch)
    }

    /// Starts the analysis of one worker's drain for `epoch` in the background.
    pub fn spawn_worker(&self, ws: Arc<WorkerShutdownState>, epoch: u64) -> JoinHandle<()> {
        self.spawn(Target::Worker(ws), epoch)
    }

    fn spawn(&self, target: Target, epoch: u64) -> JoinHandle<()> {
        self.bus
            .publish(Event::new(EventKind::AnalysisStarted).with_worker_opt(target.worker()));

        let analyzer = self.clone();
        let work_target = target.clone();
        let blocking = self.runtime.spawn_blocking(move || {
            let _guard = FinishGuard {
                target: work_target.clone(),
                epoch,
            };
            match &work_target {
                Target::Global(state) => analyzer.analyze_global(state, epoch),
                Target::Worker(ws) => analyzer.analyze_worker(ws, epoch),
            }
        });

        let bus = self.bus.clone();
        self.runtime.spawn(async move {
            match blocking.await {
                Ok(Some(count)) => {
                    debug!(scope = %target.scope(), count, "snapshot analysis published");
                    bus.publish(
                        Event::new(EventKind::AnalysisCompleted)
                            .with_worker_opt(target.worker())
                            .with_count(count),
                    );
                }
                Ok(None) => {
                    debug!(scope = %target.scope(), epoch, "stale snapshot analysis discarded");
                }
                Err(join_err) => {
                    let reason = if join_err.is_panic() {
                        panic_message(&*join_err.into_panic())
                    } else {
                        "analysis task cancelled".to_string()
                    };
                    let err = DrainError::AnalysisFailure {
                        scope: target.scope(),
                        reason,
                    };
                    warn!(label = err.as_label(), error = %err, "snapshot analysis failed; partial results kept");
                    bus.publish(
                        Event::new(EventKind::AnalysisFailed)
                            .with_worker_opt(target.worker())
                            .with_reason(err.as_message()),
                    );
                }
            }
        })
    }

    fn admits_queued(&self, settings: &ShutdownSettings, item: &WorkItem) -> bool {
        !settings.is_applicable(&item.job)
            || settings.allow_all_queued_items
            || self.resolver.has_finished_upstream(item)
    }

    /// Global analysis. Returns the permitted-set size, or `None` if the epoch
    /// went stale before the last phase was published.
    pub(crate) fn analyze_global(&self, state: &ShutdownState, epoch: u64) -> Option<usize> {
        let settings = self.config.settings();
        let pending = self.resolver.substrate().pending_items();

        let queued: Vec<WorkItemId> = pending
            .iter()
            .filter(|item| self.admits_queued(&settings, item))
            .map(|item| item.id)
            .collect();
        let published = state.publish(epoch, |inner| {
            for id in &queued {
                inner.permit(*id, true);
            }
        });
        if !published {
            return None;
        }

        let running = self.resolver.running_ids(None);
        let published = state.publish(epoch, |inner| {
            // running work is outstanding even if an admission check permitted it first
            for id in running {
                inner.permitted.insert(id);
                inner.active_ids.insert(id);
            }
        });
        if !published {
            return None;
        }

        let whitelisted: Vec<(WorkItemId, HashSet<WorkItemId>)> = pending
            .iter()
            .filter(|item| settings.is_whitelisted(&item.job.name))
            .map(|item| (item.id, self.resolver.upstream_ids(item)))
            .collect();
        let published = state.publish(epoch, |inner| {
            // upstream lineage wins over the whitelist
            for (id, upstream) in whitelisted {
                let by_lineage = inner.permitted.contains(&id)
                    || upstream.iter().any(|up| inner.permitted.contains(up));
                if !by_lineage {
                    inner.whitelisted.insert(id);
                }
            }
        });
        if !published {
            return None;
        }

        Some(state.permitted_ids().len())
    }

    /// Per-worker analysis: only work pinned to the worker or running on it.
    pub(crate) fn analyze_worker(&self, ws: &WorkerShutdownState, epoch: u64) -> Option<usize> {
        let settings = self.config.settings();
        let name = ws.name();

        let exclusive: Vec<WorkItemId> = self
            .resolver
            .substrate()
            .pending_items()
            .iter()
            .filter(|item| !self.resolver.other_worker_can_run(item, name))
            .filter(|item| self.admits_queued(&settings, item))
            .map(|item| item.id)
            .collect();
        if !ws.publish(epoch, |inner| inner.permitted.extend(exclusive)) {
            return None;
        }

        let running = self.resolver.running_ids(Some(name));
        if !ws.publish(epoch, |inner| inner.permitted.extend(running)) {
            return None;
        }

        Some(ws.permitted_ids().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MemoryStore, ShutdownSettings};
    use crate::substrate::{JobKind, JobRef, UserRef};
    use crate::test_utils::FakeSubstrate;

    fn analyzer(fake: &Arc<FakeSubstrate>, settings: ShutdownSettings) -> (SnapshotAnalyzer, Bus) {
        let store = Arc::new(MemoryStore::with_settings(settings));
        let config = Arc::new(ShutdownConfiguration::load(store).unwrap());
        let bus = Bus::new(64);
        let a = SnapshotAnalyzer::new(
            CausalityResolver::new(fake.clone()),
            config,
            bus.clone(),
            Handle::current(),
        );
        (a, bus)
    }

    fn ids(raw: &[u64]) -> Vec<WorkItemId> {
        raw.iter().copied().map(WorkItemId).collect()
    }

    #[tokio::test]
    async fn global_snapshot_permits_running_and_continuations() {
        let fake = FakeSubstrate::with_workers(&["w1", "w2"]);
        fake.start(1, "w1");
        fake.start(2, "w2");
        fake.finish(2);
        fake.queue_downstream(3, "child-of-running", 1);
        fake.queue_downstream(4, "child-of-finished", 2);
        fake.queue(5, "fresh");
        let (a, _bus) = analyzer(&fake, ShutdownSettings::default());

        let state = Arc::new(ShutdownState::new());
        let epoch = state.activate().unwrap();
        a.spawn_global(state.clone(), epoch).await.unwrap();

        assert!(!state.is_analyzing());
        assert_eq!(state.permitted_ids(), ids(&[1, 4]));
        assert_eq!(state.active_ids(), ids(&[1, 4]));
        assert!(state.whitelisted_ids().is_empty());
    }

    #[tokio::test]
    async fn allow_all_queued_and_whitelist() {
        let fake = FakeSubstrate::with_workers(&["w1"]);
        fake.queue(1, "fresh");
        fake.queue(2, "release");
        fake.enqueue(WorkItem::new(3, JobRef::new("maintenance", JobKind::Task)));
        let mut settings = ShutdownSettings::default();
        settings.allow_whitelisted_projects = true;
        settings.whitelisted_projects.insert("release".into());
        let (a, _bus) = analyzer(&fake, settings.clone());

        let state = Arc::new(ShutdownState::new());
        let epoch = state.activate().unwrap();
        a.spawn_global(state.clone(), epoch).await.unwrap();
        // non-project work is never subject to the drain
        assert_eq!(state.permitted_ids(), ids(&[3]));
        assert_eq!(state.whitelisted_ids(), ids(&[2]));

        settings.allow_all_queued_items = true;
        let (a, _bus) = analyzer(&fake, settings);
        state.deactivate();
        let epoch = state.activate().unwrap();
        a.spawn_global(state.clone(), epoch).await.unwrap();
        assert_eq!(state.permitted_ids(), ids(&[1, 2, 3]));
    }

    #[tokio::test]
    async fn stale_analysis_publishes_nothing() {
        let fake = FakeSubstrate::with_workers(&["w1"]);
        fake.start(1, "w1");
        let gate = fake.gate_scans();
        let (a, _bus) = analyzer(&fake, ShutdownSettings::default());

        let state = Arc::new(ShutdownState::new());
        let epoch = state.activate().unwrap();
        let handle = a.spawn_global(state.clone(), epoch);

        state.deactivate();
        gate.send(()).unwrap();
        handle.await.unwrap();

        assert!(!state.is_active());
        assert!(state.permitted_ids().is_empty());
        assert!(state.active_ids().is_empty());
    }

    #[tokio::test]
    async fn panic_clears_analyzing_and_reports() {
        let fake = FakeSubstrate::with_workers(&["w1"]);
        fake.panic_on_scan(true);
        let (a, bus) = analyzer(&fake, ShutdownSettings::default());
        let mut rx = bus.subscribe();

        let state = Arc::new(ShutdownState::new());
        let epoch = state.activate().unwrap();
        a.spawn_global(state.clone(), epoch).await.unwrap();

        assert!(state.is_active());
        assert!(!state.is_analyzing());
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::AnalysisStarted);
        let failed = rx.recv().await.unwrap();
        assert_eq!(failed.kind, EventKind::AnalysisFailed);
        assert!(failed.reason.unwrap().contains("queue scan exploded"));
    }

    #[tokio::test]
    async fn worker_snapshot_is_scoped() {
        let fake = FakeSubstrate::with_workers(&["w1", "w2"]);
        fake.start(1, "w1");
        fake.start(2, "w2");
        fake.finish(2);
        fake.start(9, "w2");
        // exclusive to w1 with a finished upstream
        fake.queue_downstream(3, "pinned", 2);
        fake.deny("w2", 3);
        // exclusive to w1 but a brand-new chain
        fake.queue(4, "pinned-fresh");
        fake.deny("w2", 4);
        // could run on w2
        fake.queue_downstream(5, "mobile", 2);
        let (a, _bus) = analyzer(&fake, ShutdownSettings::default());

        let ws = Arc::new(WorkerShutdownState::new("w1"));
        let epoch = ws.begin_drain(UserRef::Unknown).unwrap();
        a.spawn_worker(ws.clone(), epoch).await.unwrap();

        assert!(!ws.is_analyzing());
        assert_eq!(ws.permitted_ids(), ids(&[1, 3]));
    }
}

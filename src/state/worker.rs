//! # Per-worker drain state.
//!
//! ```text
//! Active ──drain (busy or exclusive work)──► Draining ──completion──► SettleWait
//!   │                                            ▲                      │
//!   │                                            └──── still busy ──────┤
//!   └──drain (idle)──► Offline ◄──────────────────────── idle ──────────┘
//!
//! worker back online (any phase) ──► Active
//! ```
//!
//! `SettleWait` means one settle timer is armed. Completions arriving while it
//! is armed do not arm another one. Each transition that invalidates in-flight
//! work (new drain, cancel, reset, offline) bumps `epoch`; timers and analyses
//! started under an older epoch no-op. The `analyzing` watch is written under
//! the same lock as the flag it mirrors.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use super::global::sorted;
use crate::substrate::{UserRef, WorkItemId};

/// Lifecycle phase of a worker's drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerPhase {
    /// No drain requested.
    #[default]
    Active,
    /// Draining leniently; waiting for running and exclusive work to finish.
    Draining,
    /// Draining with a settle re-check scheduled.
    SettleWait,
    /// Taken offline by this crate.
    Offline,
}

impl WorkerPhase {
    /// True while per-worker admission control applies.
    #[inline]
    pub fn is_draining(self) -> bool {
        matches!(self, WorkerPhase::Draining | WorkerPhase::SettleWait)
    }
}

#[derive(Debug, Default)]
pub(crate) struct WorkerInner {
    pub phase: WorkerPhase,
    pub epoch: u64,
    pub analyzing: bool,
    pub permitted: HashSet<WorkItemId>,
    pub triggered_by: UserRef,
}

impl WorkerInner {
    fn invalidate(&mut self, phase: WorkerPhase) {
        self.phase = phase;
        self.epoch += 1;
        self.analyzing = false;
        self.permitted.clear();
    }
}

/// Drain state of one worker.
pub struct WorkerShutdownState {
    name: Arc<str>,
    inner: Mutex<WorkerInner>,
    analysis: watch::Sender<bool>,
}

impl WorkerShutdownState {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let (analysis, _rx) = watch::channel(false);
        Self {
            name: name.into(),
            inner: Mutex::new(WorkerInner::default()),
            analysis,
        }
    }

    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, WorkerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> WorkerPhase {
        self.lock().phase
    }

    /// True while the worker is draining (`Draining` or `SettleWait`).
    pub fn is_active(&self) -> bool {
        self.phase().is_draining()
    }

    pub fn is_analyzing(&self) -> bool {
        self.lock().analyzing
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// User who requested the current drain; `Unknown` if none was recorded.
    pub fn triggered_by(&self) -> UserRef {
        self.lock().triggered_by.clone()
    }

    pub fn is_permitted(&self, id: WorkItemId) -> bool {
        self.lock().permitted.contains(&id)
    }

    /// Sorted copy of the permitted set.
    pub fn permitted_ids(&self) -> Vec<WorkItemId> {
        sorted(&self.lock().permitted)
    }

    /// Enters `Draining`. Returns the analysis epoch, or `None` if already draining.
    pub(crate) fn begin_drain(&self, user: UserRef) -> Option<u64> {
        let mut inner = self.lock();
        if inner.phase.is_draining() {
            return None;
        }
        inner.invalidate(WorkerPhase::Draining);
        inner.analyzing = true;
        inner.triggered_by = user;
        self.analysis.send_replace(true);
        Some(inner.epoch)
    }

    /// Records a direct offline transition; the drain never becomes active.
    pub(crate) fn mark_offline(&self, user: UserRef) {
        let mut inner = self.lock();
        inner.invalidate(WorkerPhase::Offline);
        inner.triggered_by = user;
        self.analysis.send_replace(false);
    }

    /// Cancels an active drain. Returns false if the worker was not draining.
    pub(crate) fn cancel(&self) -> bool {
        let mut inner = self.lock();
        if !inner.phase.is_draining() {
            return false;
        }
        inner.invalidate(WorkerPhase::Active);
        self.analysis.send_replace(false);
        true
    }

    /// Worker came back online: drop every trace of a drain.
    ///
    /// Returns false if there was nothing to reset.
    pub(crate) fn reset(&self) -> bool {
        let mut inner = self.lock();
        if inner.phase == WorkerPhase::Active && inner.permitted.is_empty() {
            return false;
        }
        inner.invalidate(WorkerPhase::Active);
        inner.triggered_by = UserRef::Unknown;
        self.analysis.send_replace(false);
        true
    }

    /// Arms the settle timer. Returns its epoch, or `None` when not `Draining`
    /// (not draining at all, or a timer is already armed).
    pub(crate) fn arm_settle(&self) -> Option<u64> {
        let mut inner = self.lock();
        if inner.phase != WorkerPhase::Draining {
            return None;
        }
        inner.phase = WorkerPhase::SettleWait;
        Some(inner.epoch)
    }

    /// True if a settle timer armed under `epoch` is still the current one.
    pub(crate) fn settle_is_current(&self, epoch: u64) -> bool {
        let inner = self.lock();
        inner.epoch == epoch && inner.phase == WorkerPhase::SettleWait
    }

    /// Settle re-check found work: back to `Draining`, timer disarmed.
    pub(crate) fn disarm(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.phase != WorkerPhase::SettleWait {
            return false;
        }
        inner.phase = WorkerPhase::Draining;
        true
    }

    /// Settle re-check found the worker idle: commit `Offline`.
    ///
    /// Returns the user to attribute the offline to and the new epoch, or
    /// `None` if stale.
    pub(crate) fn commit_offline(&self, epoch: u64) -> Option<(UserRef, u64)> {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.phase != WorkerPhase::SettleWait {
            return None;
        }
        // permitted is kept so a refused offline can resume draining as before
        inner.phase = WorkerPhase::Offline;
        inner.epoch += 1;
        inner.analyzing = false;
        self.analysis.send_replace(false);
        Some((inner.triggered_by.clone(), inner.epoch))
    }

    /// Undo [`commit_offline`](Self::commit_offline) after the substrate refused
    /// the transition. `epoch` is the epoch *after* the commit.
    pub(crate) fn revert_offline(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.phase != WorkerPhase::Offline {
            return false;
        }
        inner.phase = WorkerPhase::Draining;
        true
    }

    /// Applies `f` if `epoch` is current and the worker is still draining.
    pub(crate) fn publish(&self, epoch: u64, f: impl FnOnce(&mut WorkerInner)) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch || !inner.phase.is_draining() {
            return false;
        }
        f(&mut inner);
        true
    }

    /// Clears `analyzing` for `epoch`.
    pub(crate) fn finish_analysis(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch || !inner.analyzing {
            return false;
        }
        inner.analyzing = false;
        self.analysis.send_replace(false);
        true
    }

    /// Waits until no analysis is running for this worker.
    pub async fn wait_analysis(&self) {
        let mut rx = self.analysis.subscribe();
        let _ = rx.wait_for(|analyzing| !*analyzing).await;
    }
}

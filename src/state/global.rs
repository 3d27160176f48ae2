//! # Cluster-wide drain state.
//!
//! [`ShutdownState`] holds the live sets consulted by every global admission
//! check. It is created once, reused across toggles, and mutated only under its
//! own mutex.
//!
//! ## Sets
//! ```text
//! permitted ⊇ active_ids        allowed to run despite the drain
//! active_ids                    permitted work not yet completed ("old work")
//! whitelisted                   permitted only because of the project whitelist
//! ```
//!
//! ## Epochs
//! Every activation and deactivation bumps `epoch`. Background analyses carry
//! the epoch they were started for and publish only while it is current and
//! the drain is still active, so a late analysis cannot resurrect entries
//! after a toggle.
//!
//! The `analyzing` watch is only written under the state lock, so its value
//! always matches `analyzing` once the lock is released.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::substrate::WorkItemId;

/// Mutable contents of [`ShutdownState`], only reachable under its lock.
#[derive(Debug, Default)]
pub(crate) struct GlobalInner {
    pub active: bool,
    pub analyzing: bool,
    pub epoch: u64,
    pub permitted: HashSet<WorkItemId>,
    pub active_ids: HashSet<WorkItemId>,
    pub whitelisted: HashSet<WorkItemId>,
}

impl GlobalInner {
    /// Adds `id` to the permitted set; also tracks it as outstanding when
    /// `outstanding` is set. Returns false if it was already permitted.
    pub fn permit(&mut self, id: WorkItemId, outstanding: bool) -> bool {
        let added = self.permitted.insert(id);
        if added && outstanding {
            self.active_ids.insert(id);
        }
        added
    }

    fn clear_sets(&mut self) {
        self.permitted.clear();
        self.active_ids.clear();
        self.whitelisted.clear();
    }
}

/// Global drain state shared by admission, analysis and the operator surface.
pub struct ShutdownState {
    inner: Mutex<GlobalInner>,
    analysis: watch::Sender<bool>,
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownState {
    pub fn new() -> Self {
        let (analysis, _rx) = watch::channel(false);
        Self {
            inner: Mutex::new(GlobalInner::default()),
            analysis,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, GlobalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Turns the drain on and starts a new analysis epoch.
    ///
    /// Returns the epoch the snapshot analysis must publish under, or `None`
    /// if the drain was already active.
    pub fn activate(&self) -> Option<u64> {
        let mut inner = self.lock();
        if inner.active {
            return None;
        }
        inner.active = true;
        inner.analyzing = true;
        inner.epoch += 1;
        inner.clear_sets();
        self.analysis.send_replace(true);
        Some(inner.epoch)
    }

    /// Turns the drain off, discarding all sets and any in-flight analysis.
    ///
    /// Returns false if the drain was not active.
    pub fn deactivate(&self) -> bool {
        let mut inner = self.lock();
        if !inner.active {
            return false;
        }
        inner.active = false;
        inner.analyzing = false;
        inner.epoch += 1;
        inner.clear_sets();
        self.analysis.send_replace(false);
        true
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn is_analyzing(&self) -> bool {
        self.lock().analyzing
    }

    /// True once the snapshot analysis of the current epoch has finished
    /// (or no drain is active).
    pub fn analysis_complete(&self) -> bool {
        !self.is_analyzing()
    }

    /// Current epoch.
    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    /// Applies `f` if `epoch` is still current and the drain is active.
    pub(crate) fn publish(&self, epoch: u64, f: impl FnOnce(&mut GlobalInner)) -> bool {
        let mut inner = self.lock();
        if !inner.active || inner.epoch != epoch {
            return false;
        }
        f(&mut inner);
        true
    }

    /// Clears `analyzing` for `epoch`. A stale epoch is ignored.
    pub(crate) fn finish_analysis(&self, epoch: u64) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch || !inner.analyzing {
            return false;
        }
        inner.analyzing = false;
        self.analysis.send_replace(false);
        true
    }

    /// Waits until no analysis is running.
    pub async fn wait_analysis(&self) {
        let mut rx = self.analysis.subscribe();
        let _ = rx.wait_for(|analyzing| !*analyzing).await;
    }

    /// Marks permitted work as completed. Returns true if it was outstanding.
    pub fn complete(&self, id: WorkItemId) -> bool {
        self.lock().active_ids.remove(&id)
    }

    /// True when the drain is active, analysis is done and no old work is outstanding.
    pub fn is_drained(&self) -> bool {
        let inner = self.lock();
        inner.active && !inner.analyzing && inner.active_ids.is_empty()
    }

    pub fn is_permitted(&self, id: WorkItemId) -> bool {
        self.lock().permitted.contains(&id)
    }

    pub fn is_whitelisted(&self, id: WorkItemId) -> bool {
        self.lock().whitelisted.contains(&id)
    }

    /// Sorted copy of the permitted set.
    pub fn permitted_ids(&self) -> Vec<WorkItemId> {
        sorted(&self.lock().permitted)
    }

    /// Sorted copy of the outstanding set.
    pub fn active_ids(&self) -> Vec<WorkItemId> {
        sorted(&self.lock().active_ids)
    }

    /// Sorted copy of the whitelisted set.
    pub fn whitelisted_ids(&self) -> Vec<WorkItemId> {
        sorted(&self.lock().whitelisted)
    }
}

pub(crate) fn sorted(set: &HashSet<WorkItemId>) -> Vec<WorkItemId> {
    let mut ids: Vec<WorkItemId> = set.iter().copied().collect();
    ids.sort_unstable();
    ids
}

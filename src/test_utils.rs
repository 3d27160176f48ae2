//! In-memory substrate used by unit and scenario tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};

use crate::error::SubstrateError;
use crate::substrate::{
    ItemPhase, JobRef, OfflineCause, Placement, RunRecord, Substrate, WorkItem, WorkItemId,
    WorkerInfo, WorkerStatus,
};

#[derive(Default)]
struct Inner {
    pending: Vec<WorkItem>,
    runs: HashMap<WorkItemId, RunRecord>,
    workers: Vec<WorkerInfo>,
    denied: HashSet<(String, WorkItemId)>,
    denied_workers: HashSet<String>,
    placement_errors: HashSet<(String, WorkItemId)>,
    offline_calls: Vec<(String, OfflineCause)>,
    offline_fails: bool,
}

/// Hand-driven substrate: tests enqueue, start and finish items explicitly.
#[derive(Default)]
pub(crate) struct FakeSubstrate {
    inner: Mutex<Inner>,
    scan_gate: Mutex<Option<mpsc::Receiver<()>>>,
    panic_on_scan: AtomicBool,
}

impl FakeSubstrate {
    pub fn with_workers(names: &[&str]) -> Arc<Self> {
        let fake = Self::default();
        for name in names {
            fake.add_worker(name);
        }
        Arc::new(fake)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn add_worker(&self, name: &str) {
        self.lock().workers.push(WorkerInfo::online(name));
    }

    pub fn set_status(&self, worker: &str, status: WorkerStatus) {
        let mut inner = self.lock();
        if let Some(w) = inner.workers.iter_mut().find(|w| &*w.name == worker) {
            w.status = status;
        }
    }

    pub fn enqueue(&self, item: WorkItem) {
        self.lock().pending.push(item);
    }

    /// Enqueues a buildable project item.
    pub fn queue(&self, id: u64, project: &str) {
        self.enqueue(WorkItem::new(id, JobRef::project(project)));
    }

    /// Enqueues a buildable project item caused by `upstream`.
    pub fn queue_downstream(&self, id: u64, project: &str, upstream: u64) {
        self.enqueue(WorkItem::new(id, JobRef::project(project)).caused_by(upstream));
    }

    pub fn set_phase(&self, id: u64, phase: ItemPhase) {
        let mut inner = self.lock();
        if let Some(item) = inner.pending.iter_mut().find(|i| i.id == WorkItemId(id)) {
            item.phase = phase;
        }
    }

    pub fn mark_blocked(&self, id: u64, reason: &str) {
        let mut inner = self.lock();
        if let Some(item) = inner.pending.iter_mut().find(|i| i.id == WorkItemId(id)) {
            item.blocked = Some(reason.into());
        }
    }

    pub fn remove_pending(&self, id: u64) {
        self.lock().pending.retain(|i| i.id != WorkItemId(id));
    }

    pub fn item(&self, id: u64) -> WorkItem {
        self.lock()
            .pending
            .iter()
            .find(|i| i.id == WorkItemId(id))
            .cloned()
            .unwrap_or_else(|| panic!("item {id} not pending"))
    }

    /// Starts item `id` on `worker` (dequeuing it if pending).
    pub fn start(&self, id: u64, worker: &str) {
        let id = WorkItemId(id);
        let mut inner = self.lock();
        inner.pending.retain(|i| i.id != id);
        inner.runs.insert(
            id,
            RunRecord {
                work_item: id,
                running: true,
                built_on: worker.into(),
            },
        );
        if let Some(w) = inner.workers.iter_mut().find(|w| &*w.name == worker) {
            w.running.push(id);
        }
    }

    pub fn finish(&self, id: u64) {
        let id = WorkItemId(id);
        let mut inner = self.lock();
        if let Some(run) = inner.runs.get_mut(&id) {
            run.running = false;
        }
        for w in &mut inner.workers {
            w.running.retain(|r| *r != id);
        }
    }

    /// Drops the run record, as if garbage-collected.
    pub fn forget_run(&self, id: u64) {
        self.lock().runs.remove(&WorkItemId(id));
    }

    pub fn deny(&self, worker: &str, id: u64) {
        self.lock().denied.insert((worker.to_string(), WorkItemId(id)));
    }

    pub fn deny_all_on(&self, worker: &str) {
        self.lock().denied_workers.insert(worker.to_string());
    }

    pub fn fail_placement(&self, worker: &str, id: u64) {
        self.lock()
            .placement_errors
            .insert((worker.to_string(), WorkItemId(id)));
    }

    pub fn fail_offline(&self, fail: bool) {
        self.lock().offline_fails = fail;
    }

    pub fn offline_calls(&self) -> Vec<(String, OfflineCause)> {
        self.lock().offline_calls.clone()
    }

    /// Makes every subsequent `pending_items` call wait for one message on the
    /// returned sender. Used to hold an analysis open.
    pub fn gate_scans(&self) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        *self.scan_gate.lock().unwrap() = Some(rx);
        tx
    }

    pub fn panic_on_scan(&self, panic: bool) {
        self.panic_on_scan.store(panic, Ordering::SeqCst);
    }
}

impl Substrate for FakeSubstrate {
    fn pending_items(&self) -> Vec<WorkItem> {
        if self.panic_on_scan.load(Ordering::SeqCst) {
            panic!("queue scan exploded");
        }
        if let Some(rx) = self.scan_gate.lock().unwrap().as_ref() {
            let _ = rx.recv();
        }
        self.lock().pending.clone()
    }

    fn run_record(&self, id: WorkItemId) -> Option<RunRecord> {
        self.lock().runs.get(&id).cloned()
    }

    fn workers(&self) -> Vec<WorkerInfo> {
        self.lock().workers.clone()
    }

    fn can_place(&self, worker: &str, item: &WorkItem) -> Result<Placement, SubstrateError> {
        let inner = self.lock();
        let key = (worker.to_string(), item.id);
        if inner.placement_errors.contains(&key) {
            return Err(SubstrateError::new("label expression failed to evaluate"));
        }
        if inner.denied_workers.contains(worker) || inner.denied.contains(&key) {
            return Ok(Placement::Deny("label mismatch".into()));
        }
        Ok(Placement::Allow)
    }

    fn take_offline(&self, worker: &str, cause: OfflineCause) -> Result<(), SubstrateError> {
        let mut inner = self.lock();
        if inner.offline_fails {
            return Err(SubstrateError::new("agent channel closed"));
        }
        inner.offline_calls.push((worker.to_string(), cause));
        if let Some(w) = inner.workers.iter_mut().find(|w| &*w.name == worker) {
            w.status = WorkerStatus::TemporarilyOffline;
        }
        Ok(())
    }
}

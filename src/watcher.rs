//! # Idle-drain watcher.
//!
//! [`IdleDrainWatcher`] drives the per-worker drain lifecycle: it decides at
//! request time whether a worker can go offline at once, arms the settle
//! re-check on completions, and takes the worker offline once it is idle.
//!
//! ```text
//! request_drain(w, user)
//!   ├─ busy or exclusive work ─► begin_drain ─► spawn_worker analysis ─► Draining
//!   └─ idle ───────────────────► take_offline ─► Offline   (drain never active)
//!
//! on_completion(w)     Draining ─► SettleWait ─► sleep(settle_delay) ─┐
//!                      SettleWait ─► no-op (timer already armed)      │
//!                                                                     ▼
//!                               recheck(epoch): stale ─► no-op
//!                                               idle  ─► Offline ─► take_offline
//!                                               busy  ─► Draining (disarmed)
//!
//! on_worker_online(w)  any phase ─► Active   (armed timers go stale)
//! ```
//!
//! Settle timers are tokio tasks that also stop when the runtime token is
//! cancelled. The re-check calls the substrate on the blocking pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analysis::SnapshotAnalyzer;
use crate::causality::CausalityResolver;
use crate::error::DrainError;
use crate::events::{Bus, Event, EventKind};
use crate::state::{WorkerShutdownState, WorkerStates};
use crate::substrate::{OfflineCause, UserRef};

/// Outcome of a worker drain request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerDrain {
    /// The worker had running or pinned work and is now draining.
    Draining,
    /// The worker was idle and was taken offline immediately.
    TakenOffline,
}

/// Per-worker drain lifecycle driver.
#[derive(Clone)]
pub struct IdleDrainWatcher {
    resolver: CausalityResolver,
    workers: Arc<WorkerStates>,
    analyzer: SnapshotAnalyzer,
    bus: Bus,
    settle_delay: Duration,
    runtime: Handle,
    token: CancellationToken,
}

impl IdleDrainWatcher {
    pub fn new(
        resolver: CausalityResolver,
        workers: Arc<WorkerStates>,
        analyzer: SnapshotAnalyzer,
        bus: Bus,
        settle_delay: Duration,
        runtime: Handle,
        token: CancellationToken,
    ) -> Self {
        Self {
            resolver,
            workers,
            analyzer,
            bus,
            settle_delay,
            runtime,
            token,
        }
    }

    /// Requests a lenient drain of `worker`.
    ///
    /// A worker that is already draining stays draining and no new analysis is
    /// started. If the substrate refuses an immediate offline, the error is
    /// returned and the worker's state is left untouched.
    pub fn request_drain(&self, worker: &str, user: UserRef) -> Result<WorkerDrain, DrainError> {
        let ws = self.workers.get_or_create(worker);
        if ws.is_active() {
            return Ok(WorkerDrain::Draining);
        }

        if self.resolver.is_busy(worker) || self.resolver.has_exclusive_work(worker) {
            if let Some(epoch) = ws.begin_drain(user.clone()) {
                info!(worker, %user, "worker draining leniently");
                self.bus.publish(
                    Event::new(EventKind::WorkerDrainRequested)
                        .with_worker(ws.name().clone())
                        .with_user(&user),
                );
                self.analyzer.spawn_worker(Arc::clone(&ws), epoch);
            }
            return Ok(WorkerDrain::Draining);
        }

        let cause = OfflineCause::lenient(user.clone());
        self.resolver
            .substrate()
            .take_offline(worker, cause.clone())
            .map_err(|source| DrainError::OfflineTransition {
                worker: ws.name().clone(),
                source,
            })?;
        ws.mark_offline(user.clone());
        info!(worker, %user, "idle worker taken offline");
        self.publish_offline(&ws, &user, &cause);
        Ok(WorkerDrain::TakenOffline)
    }

    /// Cancels the drain of `worker`. Returns false if it was not draining.
    pub fn cancel(&self, worker: &str) -> bool {
        let Some(ws) = self.workers.get(worker) else {
            return false;
        };
        if !ws.cancel() {
            return false;
        }
        info!(worker, "worker drain cancelled");
        self.bus
            .publish(Event::new(EventKind::WorkerDrainCancelled).with_worker(ws.name().clone()));
        true
    }

    /// Completion on `worker`: arms the settle re-check if the worker is
    /// draining and no timer is armed yet.
    ///
    /// Returns the timer task when one was armed.
    pub fn on_completion(&self, worker: &str) -> Option<JoinHandle<()>> {
        let ws = self.workers.get(worker)?;
        let epoch = ws.arm_settle()?;
        self.bus.publish(
            Event::new(EventKind::SettleScheduled)
                .with_worker(ws.name().clone())
                .with_delay(self.settle_delay),
        );

        let watcher = self.clone();
        let token = self.token.clone();
        let delay = self.settle_delay;
        Some(self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let check = tokio::task::spawn_blocking(move || watcher.recheck(&ws, epoch));
                    if let Err(join_err) = check.await {
                        warn!(error = %join_err, "settle re-check aborted");
                    }
                }
            }
        }))
    }

    /// Worker came back online: discard any drain state for it.
    pub fn on_worker_online(&self, worker: &str) {
        let Some(ws) = self.workers.get(worker) else {
            return;
        };
        if ws.reset() {
            debug!(worker, "worker online; drain state reset");
            self.bus
                .publish(Event::new(EventKind::WorkerReset).with_worker(ws.name().clone()));
        }
    }

    fn recheck(&self, ws: &WorkerShutdownState, epoch: u64) {
        let name = ws.name();
        if !ws.settle_is_current(epoch) {
            debug!(worker = %name, epoch, "stale settle re-check ignored");
            return;
        }

        let online = self
            .resolver
            .substrate()
            .worker(name)
            .is_some_and(|w| w.is_online());
        let idle = online && !self.resolver.is_busy(name) && !self.resolver.has_exclusive_work(name);
        if !idle {
            if ws.disarm(epoch) {
                debug!(worker = %name, "worker still has work; draining continues");
            }
            return;
        }

        let Some((user, committed)) = ws.commit_offline(epoch) else {
            return;
        };
        let cause = OfflineCause::lenient(user.clone());
        match self.resolver.substrate().take_offline(name, cause.clone()) {
            Ok(()) => {
                info!(worker = %name, %user, "drained worker taken offline");
                self.publish_offline(ws, &user, &cause);
            }
            Err(source) => {
                let err = DrainError::OfflineTransition {
                    worker: name.clone(),
                    source,
                };
                warn!(label = err.as_label(), error = %err, "worker stays draining");
                ws.revert_offline(committed);
            }
        }
    }

    fn publish_offline(&self, ws: &WorkerShutdownState, user: &UserRef, cause: &OfflineCause) {
        self.bus.publish(
            Event::new(EventKind::WorkerOffline)
                .with_worker(ws.name().clone())
                .with_user(user)
                .with_reason(cause.message.clone()),
        );
    }
}

//! # Drain: owns the drain state and wires admission, analysis and the watcher.
//!
//! The [`Drain`] owns the event bus, a [`SubscriberSet`], the live
//! configuration and every piece of drain state. It is the single object the
//! substrate adapter talks to (through [`DrainHooks`]) and the single object
//! operator commands act on.
//!
//! ## High-level architecture
//! ```text
//! Operator:                                 Substrate adapter:
//!   activate / deactivate / toggle            on_admission_check(item)
//!   drain_worker / cancel_worker_drain        on_worker_admission_check(item, w)
//!            │                                on_completion(id, w) / on_worker_online(w)
//!            ▼                                          │
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │ Drain                                                                 │
//! │  ShutdownConfiguration ── ShutdownState ── WorkerStates               │
//! │  AdmissionPolicy  (sync checks, never waits)                          │
//! │  SnapshotAnalyzer (spawn_blocking per activation, epoch guarded)      │
//! │  IdleDrainWatcher (settle timers, offline transitions)                │
//! │  runtime_token    (stops listener and timers)                         │
//! └──────────────────────────────┬────────────────────────────────────────┘
//!                                ▼ publish(Event)
//!                               Bus ──► subscriber_listener ──► SubscriberSet
//! ```
//!
//! ## Rules
//! - Operator calls return immediately; the snapshot analysis runs in the
//!   background and is observed through `is_analyzing()` / `wait_analysis()`.
//! - Settings passed with an activation are applied before the drain flips on.
//!   A persistence failure is logged and published but does not stop it.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hooks::DrainHooks;
use crate::admission::{Admission, AdmissionPolicy};
use crate::analysis::SnapshotAnalyzer;
use crate::causality::CausalityResolver;
use crate::config::{Config, ShutdownConfiguration, ShutdownSettings};
use crate::error::DrainError;
use crate::events::{Bus, Event, EventKind};
use crate::state::{ShutdownState, WorkerPhase, WorkerShutdownState, WorkerStates};
use crate::subscribers::SubscriberSet;
use crate::substrate::{Substrate, UserRef, WorkItem, WorkItemId};
use crate::watcher::{IdleDrainWatcher, WorkerDrain};

/// Settings applied together with a global activation.
///
/// Unset fields keep their current value.
#[derive(Clone, Debug, Default)]
pub struct ActivateOptions {
    /// Operator turning the drain on.
    pub user: UserRef,
    /// Message shown on blocked items.
    pub message: Option<String>,
    /// Let every item queued at activation time run.
    pub allow_all_queued_items: Option<bool>,
    /// Enable or disable the project whitelist.
    pub allow_whitelisted_projects: Option<bool>,
    /// Replace the whitelist.
    pub whitelisted_projects: Option<BTreeSet<String>>,
}

impl ActivateOptions {
    pub fn by(user: UserRef) -> Self {
        Self {
            user,
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn allow_all_queued(mut self, allow: bool) -> Self {
        self.allow_all_queued_items = Some(allow);
        self
    }

    /// Enables the whitelist with the given projects.
    pub fn allow_whitelisted(mut self, projects: BTreeSet<String>) -> Self {
        self.allow_whitelisted_projects = Some(true);
        self.whitelisted_projects = Some(projects);
        self
    }

    fn changes_settings(&self) -> bool {
        self.message.is_some()
            || self.allow_all_queued_items.is_some()
            || self.allow_whitelisted_projects.is_some()
            || self.whitelisted_projects.is_some()
    }

    fn apply(&self, settings: &mut ShutdownSettings) {
        if let Some(message) = &self.message {
            settings.message = message.clone();
        }
        if let Some(allow) = self.allow_all_queued_items {
            settings.allow_all_queued_items = allow;
        }
        if let Some(allow) = self.allow_whitelisted_projects {
            settings.allow_whitelisted_projects = allow;
        }
        if let Some(projects) = &self.whitelisted_projects {
            settings.whitelisted_projects = projects
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
    }
}

/// Lenient-drain coordinator.
pub struct Drain {
    cfg: Config,
    bus: Bus,
    subs: Mutex<Option<Arc<SubscriberSet>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    config: Arc<ShutdownConfiguration>,
    global: Arc<ShutdownState>,
    workers: Arc<WorkerStates>,
    resolver: CausalityResolver,
    policy: AdmissionPolicy,
    analyzer: SnapshotAnalyzer,
    watcher: IdleDrainWatcher,
    runtime_token: CancellationToken,
    // serializes operator toggles: check, settings and flip happen as one step
    activation: Mutex<()>,
}

/// Components assembled by [`DrainBuilder`](super::DrainBuilder).
pub(super) struct DrainParts {
    pub cfg: Config,
    pub bus: Bus,
    pub subs: Arc<SubscriberSet>,
    pub config: Arc<ShutdownConfiguration>,
    pub resolver: CausalityResolver,
    pub analyzer: SnapshotAnalyzer,
    pub workers: Arc<WorkerStates>,
    pub watcher: IdleDrainWatcher,
    pub runtime_token: CancellationToken,
}

impl Drain {
    pub(super) fn new_internal(parts: DrainParts) -> Self {
        let global = Arc::new(ShutdownState::new());
        let policy = AdmissionPolicy::new(
            Arc::clone(&parts.config),
            parts.resolver.clone(),
            Arc::clone(&global),
            Arc::clone(&parts.workers),
        );
        Self {
            cfg: parts.cfg,
            bus: parts.bus,
            subs: Mutex::new(Some(parts.subs)),
            listener: Mutex::new(None),
            config: parts.config,
            global,
            workers: parts.workers,
            resolver: parts.resolver,
            policy,
            analyzer: parts.analyzer,
            watcher: parts.watcher,
            runtime_token: parts.runtime_token,
            activation: Mutex::new(()),
        }
    }

    /// Subscribes to the bus and forwards events to the subscriber set until
    /// the runtime token is cancelled. Events already queued at that point are
    /// still delivered.
    pub(super) fn subscriber_listener(&self) {
        let Some(set) = self
            .subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        else {
            return;
        };
        let mut rx = self.bus.subscribe();
        let token = self.runtime_token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "subscriber listener lagged; events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
            while let Ok(ev) = rx.try_recv() {
                set.emit(&ev);
            }
        });
        *self.listener.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Runtime configuration this drain was built with.
    pub fn runtime_config(&self) -> &Config {
        &self.cfg
    }

    /// Live shutdown settings.
    pub fn config(&self) -> &Arc<ShutdownConfiguration> {
        &self.config
    }

    /// Global drain state.
    pub fn state(&self) -> &Arc<ShutdownState> {
        &self.global
    }

    pub fn substrate(&self) -> &Arc<dyn Substrate> {
        self.resolver.substrate()
    }

    /// Receiver for events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Applies `f` to the shutdown settings and persists them.
    ///
    /// On a persistence failure the change stays applied in memory.
    pub fn update_settings<F>(&self, f: F) -> Result<(), DrainError>
    where
        F: FnOnce(&mut ShutdownSettings),
    {
        match self.config.update(f) {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::ConfigUpdated));
                Ok(())
            }
            Err(err) => {
                self.bus.publish(
                    Event::new(EventKind::ConfigPersistFailed).with_reason(err.as_message()),
                );
                Err(err)
            }
        }
    }

    /// Turns the global drain on and starts the snapshot analysis.
    ///
    /// Returns false (and leaves settings untouched) if the drain was already
    /// active.
    pub fn activate(&self, opts: ActivateOptions) -> bool {
        let _toggling = self.lock_activation();
        self.activate_locked(opts)
    }

    /// Turns the global drain off. Returns false if it was not active.
    pub fn deactivate(&self) -> bool {
        let _toggling = self.lock_activation();
        self.deactivate_locked()
    }

    /// Flips the global drain with the current settings. Returns the new state.
    pub fn toggle(&self) -> bool {
        let _toggling = self.lock_activation();
        if self.deactivate_locked() {
            return false;
        }
        self.activate_locked(ActivateOptions::default())
    }

    fn lock_activation(&self) -> MutexGuard<'_, ()> {
        self.activation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn activate_locked(&self, opts: ActivateOptions) -> bool {
        if self.global.is_active() {
            return false;
        }
        if opts.changes_settings() {
            // persistence failure is already logged and published
            let _ = self.update_settings(|settings| opts.apply(settings));
        }
        let Some(epoch) = self.global.activate() else {
            return false;
        };

        let message = self.config.message();
        info!(user = %opts.user, %message, "global drain activated");
        self.bus.publish(
            Event::new(EventKind::ShutdownActivated)
                .with_user(&opts.user)
                .with_reason(message),
        );
        self.analyzer.spawn_global(Arc::clone(&self.global), epoch);
        true
    }

    fn deactivate_locked(&self) -> bool {
        if !self.global.deactivate() {
            return false;
        }
        info!("global drain deactivated");
        self.bus.publish(Event::new(EventKind::ShutdownDeactivated));
        true
    }

    pub fn is_active(&self) -> bool {
        self.global.is_active()
    }

    /// True while the snapshot analysis of the current activation runs.
    pub fn is_analyzing(&self) -> bool {
        self.global.is_analyzing()
    }

    /// Resolves once the global snapshot analysis has finished.
    pub async fn wait_analysis(&self) {
        self.global.wait_analysis().await;
    }

    /// True once every item permitted as old work has completed.
    pub fn is_drained(&self) -> bool {
        self.global.is_drained()
    }

    /// Requests a lenient drain of `worker`.
    pub fn drain_worker(&self, worker: &str, user: UserRef) -> Result<WorkerDrain, DrainError> {
        self.watcher.request_drain(worker, user)
    }

    /// Cancels the drain of `worker`. Returns false if it was not draining.
    pub fn cancel_worker_drain(&self, worker: &str) -> bool {
        self.watcher.cancel(worker)
    }

    pub fn is_worker_draining(&self, worker: &str) -> bool {
        self.workers.is_draining(worker)
    }

    pub fn worker_phase(&self, worker: &str) -> WorkerPhase {
        self.workers.phase(worker)
    }

    /// Drain state of `worker`, if it was ever referenced.
    pub fn worker_state(&self, worker: &str) -> Option<Arc<WorkerShutdownState>> {
        self.workers.get(worker)
    }

    /// Sorted names of draining workers.
    pub fn draining_workers(&self) -> Vec<String> {
        self.workers.draining()
    }

    /// Stops settle timers and the listener, then flushes subscribers.
    ///
    /// Drain state stays readable; admission keeps working.
    pub async fn shutdown(&self) {
        self.runtime_token.cancel();
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = listener {
            let _ = handle.await;
        }
        let subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(set) = subs.and_then(|s| Arc::try_unwrap(s).ok()) {
            set.shutdown().await;
        }
    }
}

impl DrainHooks for Drain {
    fn on_admission_check(&self, item: &WorkItem) -> Admission {
        self.policy.check(item)
    }

    fn on_worker_admission_check(&self, item: &WorkItem, worker: &str) -> Admission {
        self.policy.check_on_worker(item, worker)
    }

    fn on_completion(&self, item: WorkItemId, worker: &str) {
        if self.global.complete(item) && self.global.is_drained() {
            info!(last = %item, "all pre-drain work completed");
        }
        if self.watcher.on_completion(worker).is_some() {
            debug!(worker, item = %item, "settle re-check armed");
        }
    }

    fn on_worker_online(&self, worker: &str) {
        self.watcher.on_worker_online(worker);
    }
}

//! # draingate
//!
//! **Draingate** is lenient drain admission control for build-execution
//! clusters.
//!
//! When an operator starts a drain, work already in flight (and the work it
//! directly causes) is allowed to finish, while unrelated new work is held in
//! the queue with a human-readable reason. A worker can be drained the same
//! way: it finishes what it has, sheds what other workers can take, and goes
//! offline once it has been idle for a settle delay.
//!
//! The crate never runs or places work. It answers admission questions for a
//! substrate (queue, workers, run records) that it reads through the
//! [`Substrate`] trait, and is driven by that substrate through [`DrainHooks`].
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Operator (CLI / web)                      Substrate adapter
//!          │                                          │
//!          ▼                                          │ on_admission_check
//!   ┌──────────────┐                                  │ on_worker_admission_check
//!   │  Controller  │ PermissionGate                   │ on_completion
//!   └──────┬───────┘                                  │ on_worker_online
//!          ▼                                          ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Drain                                                            │
//! │  - ShutdownConfiguration (persisted settings, ConfigStore)        │
//! │  - ShutdownState / WorkerStates (epoch-guarded drain state)       │
//! │  - AdmissionPolicy (sync checks, never waits)                     │
//! │  - SnapshotAnalyzer (background permitted-set computation)        │
//! │  - IdleDrainWatcher (settle timers, offline transitions)          │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        │ reads            │ publishes        │ take_offline
//!        ▼                  ▼                  ▼
//!   CausalityResolver      Bus             Substrate
//!        │                  │
//!        ▼                  ▼
//!    Substrate     subscriber_listener ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Global drain lifecycle
//! ```text
//! activate(opts) ──► apply settings ──► epoch += 1 ──► analyzing = true
//!                                                        │
//!            ┌───────────────────────────────────────────┘
//!            ▼
//!   SnapshotAnalyzer (spawn_blocking)
//!     ├─ queued items with finished upstream ─► permitted
//!     ├─ running items                        ─► permitted + outstanding
//!     └─ whitelisted projects                 ─► whitelisted
//!
//! on_admission_check(item)
//!     ├─ inactive / not applicable      ─► Allow
//!     ├─ permitted / upstream permitted ─► Allow (outstanding)
//!     ├─ whitelisted                    ─► Allow
//!     └─ otherwise                      ─► Block("Going to shut down")
//!
//! on_completion(id) ─► outstanding -= id ─► is_drained() once empty
//! deactivate()      ─► epoch += 1, every set cleared
//! ```
//!
//! ### Worker drain lifecycle
//! ```text
//! Active ──drain_worker──► idle? ──yes──► take_offline ──► Offline
//!                            │
//!                            no
//!                            ▼
//!                        Draining ──on_completion──► SettleWait
//!                            ▲                          │ settle_delay
//!                            └──── still busy ◄──── re-check ──idle──► Offline
//! Offline ──on_worker_online──► Active
//! ```
//!
//! ## Features
//! | Area              | Description                                               | Key types / traits                         |
//! |-------------------|-----------------------------------------------------------|--------------------------------------------|
//! | **Drain**         | Global and per-worker drains, admission hooks.            | [`Drain`], [`DrainBuilder`], [`DrainHooks`] |
//! | **Admission**     | Allow/block decisions with grant and reason.              | [`Admission`], [`Grant`], [`Blockage`]     |
//! | **Operator**      | Permission-checked commands and status.                   | [`Controller`], [`PermissionGate`]         |
//! | **Substrate**     | Read-only view of queue, runs and workers.                | [`Substrate`], [`WorkItem`], [`WorkerInfo`] |
//! | **Configuration** | Runtime knobs and persisted shutdown settings.            | [`Config`], [`ShutdownSettings`]           |
//! | **Events**        | Drain lifecycle events for logging and auditing.          | [`Event`], [`EventKind`], [`Subscribe`]    |
//! | **Errors**        | Typed, recoverable errors.                                | [`DrainError`], [`ControlError`]           |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a subscriber that forwards
//!   drain events to `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use draingate::{
//!     ActivateOptions, Config, Controller, DrainBuilder, DrainHooks, OfflineCause, Placement,
//!     RunRecord, Substrate, SubstrateError, UserRef, WorkItem, WorkItemId, WorkerInfo,
//! };
//!
//! struct EmptyCluster;
//!
//! impl Substrate for EmptyCluster {
//!     fn pending_items(&self) -> Vec<WorkItem> { Vec::new() }
//!     fn run_record(&self, _id: WorkItemId) -> Option<RunRecord> { None }
//!     fn workers(&self) -> Vec<WorkerInfo> { vec![WorkerInfo::online("agent-1")] }
//!     fn can_place(&self, _w: &str, _i: &WorkItem) -> Result<Placement, SubstrateError> {
//!         Ok(Placement::Allow)
//!     }
//!     fn take_offline(&self, _w: &str, _c: OfflineCause) -> Result<(), SubstrateError> {
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn draingate::Subscribe>> = vec![Arc::new(draingate::LogWriter::default())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn draingate::Subscribe>> = Vec::new();
//!
//!     let drain = DrainBuilder::new(Config::default(), Arc::new(EmptyCluster))
//!         .with_subscribers(subs)
//!         .build()?;
//!     let ctl = Controller::new(Arc::clone(&drain));
//!
//!     ctl.quiet_down(UserRef::named("ops"), ActivateOptions::default().with_message("Upgrade at 18:00"))?;
//!     drain.wait_analysis().await;
//!
//!     let fresh = WorkItem::new(1, draingate::JobRef::project("nightly"));
//!     let admission = drain.on_admission_check(&fresh);
//!     assert_eq!(admission.blockage().map(|b| b.reason()).as_deref(), Some("Upgrade at 18:00"));
//!
//!     drain.shutdown().await;
//!     Ok(())
//! }
//! ```
mod admission;
mod analysis;
mod causality;
mod config;
mod controller;
mod core;
mod error;
mod events;
mod state;
mod subscribers;
mod substrate;
mod watcher;

#[cfg(test)]
mod test_utils;

// ---- Public re-exports ----

pub use admission::{Admission, AdmissionPolicy, Blockage, Grant};
pub use analysis::SnapshotAnalyzer;
pub use causality::CausalityResolver;
pub use config::{
    Config, ConfigStore, DEFAULT_MESSAGE, JsonFileStore, MemoryStore, ShutdownConfiguration,
    ShutdownSettings, parse_project_list,
};
pub use controller::{
    Action, AllowAll, BlockedItem, CommandOutcome, ControlError, Controller, DrainStatus,
    PermissionGate,
};
pub use core::{ActivateOptions, Drain, DrainBuilder, DrainHooks};
pub use error::{DrainError, Scope, StoreError, SubstrateError};
pub use events::{Bus, Event, EventKind};
pub use state::{ShutdownState, WorkerPhase, WorkerShutdownState, WorkerStates};
pub use subscribers::{Subscribe, SubscriberSet};
pub use substrate::{
    ItemPhase, JobKind, JobRef, OfflineCause, Placement, RunRecord, Substrate, UpstreamCause,
    UserRef, WorkItem, WorkItemId, WorkerInfo, WorkerStatus,
};
pub use watcher::{IdleDrainWatcher, WorkerDrain};

// Optional: expose the built-in tracing subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;

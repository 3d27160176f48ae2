//! # Operator commands over a [`Drain`].
//!
//! [`Controller`] is the surface a CLI or web endpoint binds to. It adds what
//! the raw drain API leaves to the caller: a permission check per command,
//! precondition errors an operator can act on, and a printable status.
//!
//! ## Rules
//! - Every mutating command asks the [`PermissionGate`] first; a refusal
//!   changes nothing.
//! - `cancel_quiet_down` on an inactive drain is a successful no-op, so it can
//!   run unattended.
//! - Worker commands resolve the worker through the substrate before touching
//!   drain state.

use std::sync::Arc;

use tracing::{info, warn};

use super::error::ControlError;
use super::gate::{Action, AllowAll, PermissionGate};
use super::status::DrainStatus;
use crate::core::{ActivateOptions, Drain};
use crate::substrate::UserRef;
use crate::watcher::WorkerDrain;

/// What a successful command did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The global drain was turned on.
    Activated,
    /// The global drain was turned off.
    Deactivated,
    /// Nothing to cancel.
    NotActive,
    /// The worker is draining and will go offline once idle.
    Draining,
    /// The worker was idle and went offline immediately.
    TakenOffline,
    /// The worker drain was cancelled.
    DrainCancelled,
    /// The worker was not draining.
    NotDraining,
}

/// Permission-checked operator surface.
#[derive(Clone)]
pub struct Controller {
    drain: Arc<Drain>,
    gate: Arc<dyn PermissionGate>,
}

impl Controller {
    /// Controller that permits every command.
    pub fn new(drain: Arc<Drain>) -> Self {
        Self::with_gate(drain, Arc::new(AllowAll))
    }

    pub fn with_gate(drain: Arc<Drain>, gate: Arc<dyn PermissionGate>) -> Self {
        Self { drain, gate }
    }

    pub fn drain(&self) -> &Arc<Drain> {
        &self.drain
    }

    fn authorize(&self, user: &UserRef, action: Action) -> Result<(), ControlError> {
        if self.gate.permits(user, action) {
            return Ok(());
        }
        let err = ControlError::PermissionDenied {
            user: user.clone(),
            action,
        };
        warn!(label = err.as_label(), %user, action = action.as_str(), "operator command refused");
        Err(err)
    }

    fn known_worker(&self, name: &str) -> Result<(), ControlError> {
        match self.drain.substrate().worker(name) {
            Some(_) => Ok(()),
            None => Err(ControlError::UnknownWorker(name.into())),
        }
    }

    /// Starts a global drain with `options` applied first.
    pub fn quiet_down(
        &self,
        user: UserRef,
        options: ActivateOptions,
    ) -> Result<CommandOutcome, ControlError> {
        self.authorize(&user, Action::ManageShutdown)?;
        if self.drain.is_active() {
            return Err(ControlError::AlreadyShuttingDown);
        }
        let opts = ActivateOptions { user, ..options };
        if self.drain.activate(opts) {
            Ok(CommandOutcome::Activated)
        } else {
            Err(ControlError::AlreadyShuttingDown)
        }
    }

    /// Ends the global drain, if any.
    pub fn cancel_quiet_down(&self, user: UserRef) -> Result<CommandOutcome, ControlError> {
        self.authorize(&user, Action::ManageShutdown)?;
        if self.drain.deactivate() {
            info!(%user, "quiet down cancelled");
            Ok(CommandOutcome::Deactivated)
        } else {
            Ok(CommandOutcome::NotActive)
        }
    }

    /// Flips the global drain. A `message` only applies when turning it on.
    pub fn toggle_quiet_down(
        &self,
        user: UserRef,
        message: Option<String>,
    ) -> Result<CommandOutcome, ControlError> {
        self.authorize(&user, Action::ManageShutdown)?;
        if self.drain.deactivate() {
            info!(%user, "quiet down toggled off");
            return Ok(CommandOutcome::Deactivated);
        }
        let mut opts = ActivateOptions::by(user);
        opts.message = message;
        if self.drain.activate(opts) {
            Ok(CommandOutcome::Activated)
        } else {
            Err(ControlError::AlreadyShuttingDown)
        }
    }

    /// Drains worker `name` leniently.
    pub fn offline_worker(&self, user: UserRef, name: &str) -> Result<CommandOutcome, ControlError> {
        self.authorize(&user, Action::DisconnectWorker)?;
        self.known_worker(name)?;
        if self.drain.is_worker_draining(name) {
            return Err(ControlError::WorkerAlreadyDraining(name.into()));
        }
        match self.drain.drain_worker(name, user)? {
            WorkerDrain::Draining => Ok(CommandOutcome::Draining),
            WorkerDrain::TakenOffline => Ok(CommandOutcome::TakenOffline),
        }
    }

    /// Cancels the drain of worker `name`.
    pub fn cancel_worker_drain(
        &self,
        user: UserRef,
        name: &str,
    ) -> Result<CommandOutcome, ControlError> {
        self.authorize(&user, Action::DisconnectWorker)?;
        self.known_worker(name)?;
        if self.drain.cancel_worker_drain(name) {
            info!(%user, worker = name, "worker drain cancelled");
            Ok(CommandOutcome::DrainCancelled)
        } else {
            Ok(CommandOutcome::NotDraining)
        }
    }

    /// Snapshot of the drain and of the items it currently blocks.
    pub fn status(&self) -> DrainStatus {
        DrainStatus::capture(&self.drain)
    }
}

use std::sync::Arc;

use thiserror::Error;

use super::gate::Action;
use crate::error::DrainError;
use crate::substrate::UserRef;

/// Error returned by [`Controller`](crate::Controller) commands.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ControlError {
    /// The permission gate refused the action.
    #[error("{user} lacks permission to {}", action.as_str())]
    PermissionDenied {
        /// Requesting user.
        user: UserRef,
        /// Refused action.
        action: Action,
    },

    /// A global drain is already active.
    #[error("already shutting down")]
    AlreadyShuttingDown,

    /// The substrate does not know the worker.
    #[error("no such worker: {0}")]
    UnknownWorker(Arc<str>),

    /// The worker is already draining.
    #[error("worker {0} is already draining")]
    WorkerAlreadyDraining(Arc<str>),

    /// The drain runtime failed underneath the command.
    #[error(transparent)]
    Drain(#[from] DrainError),
}

impl ControlError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::PermissionDenied { .. } => "permission_denied",
            ControlError::AlreadyShuttingDown => "already_shutting_down",
            ControlError::UnknownWorker(_) => "unknown_worker",
            ControlError::WorkerAlreadyDraining(_) => "worker_already_draining",
            ControlError::Drain(err) => err.as_label(),
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ControlError::Drain(err) => err.as_message(),
            other => other.to_string(),
        }
    }
}

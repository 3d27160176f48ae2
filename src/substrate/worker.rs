use std::fmt;
use std::sync::Arc;

use super::WorkItemId;

/// Connection status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Online,
    Offline,
    /// Connected but not accepting work (taken offline by an operator or by a drain).
    TemporarilyOffline,
}

/// Snapshot of a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Unique worker name.
    pub name: Arc<str>,
    /// Connection status.
    pub status: WorkerStatus,
    /// Work items whose runs currently occupy an executor on this worker.
    pub running: Vec<WorkItemId>,
}

impl WorkerInfo {
    /// Creates an idle online worker.
    pub fn online(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            status: WorkerStatus::Online,
            running: Vec::new(),
        }
    }

    #[inline]
    pub fn is_online(&self) -> bool {
        matches!(self.status, WorkerStatus::Online)
    }

    /// True when at least one executor is busy.
    #[inline]
    pub fn is_busy(&self) -> bool {
        !self.running.is_empty()
    }
}

/// Result of the substrate's placement test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Allow,
    Deny(Arc<str>),
}

impl Placement {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Placement::Allow)
    }
}

/// User that triggered an operator action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum UserRef {
    Known(Arc<str>),
    /// Sentinel used when the triggering user is not known.
    #[default]
    Unknown,
}

impl UserRef {
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        UserRef::Known(name.into())
    }

    /// The user's name, or `None` for the sentinel.
    pub fn name(&self) -> Option<&Arc<str>> {
        match self {
            UserRef::Known(name) => Some(name),
            UserRef::Unknown => None,
        }
    }
}

impl fmt::Display for UserRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserRef::Known(name) => f.write_str(name),
            UserRef::Unknown => f.write_str("unknown"),
        }
    }
}

/// Why a worker was taken offline by this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineCause {
    /// User who requested the lenient offline.
    pub triggered_by: UserRef,
    /// Human-readable description shown by the substrate.
    pub message: Arc<str>,
}

impl OfflineCause {
    /// Cause for a lenient offline requested by `user`.
    pub fn lenient(user: UserRef) -> Self {
        let message = format!("Taken offline leniently by {user}");
        Self {
            triggered_by: user,
            message: message.into(),
        }
    }
}

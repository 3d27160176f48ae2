//! Error types used by the drain runtime and its collaborators.
//!
//! This module defines the main error enums:
//!
//! - [`DrainError`]: failures inside the drain machinery itself.
//! - [`StoreError`]: failures reading or writing persisted settings.
//! - [`SubstrateError`]: failures reported by the job/queue/worker substrate.
//!
//! None of these are fatal to the host process. The only user-visible outcome
//! of this subsystem is a blocked item's reason string; everything else is
//! logged and recovered from. All types provide `as_label` (stable snake_case
//! for logs/metrics) and `as_message` helpers.

use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::substrate::WorkItemId;

/// Error reported by the substrate (queue, workers, placement test).
///
/// The substrate is an external collaborator, so the error is an opaque message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SubstrateError(pub String);

impl SubstrateError {
    /// Creates an error from anything printable.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// # Errors produced while loading or persisting settings.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure (open, write, fsync, rename).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The settings file exists but is not valid JSON for [`ShutdownSettings`](crate::ShutdownSettings).
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Store was configured to reject writes (used by volatile stores in tests).
    #[error("store rejected write: {0}")]
    Rejected(String),
}

impl StoreError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            StoreError::Io(_) => "store_io",
            StoreError::Json(_) => "store_json",
            StoreError::Rejected(_) => "store_rejected",
        }
    }
}

/// Which drain an analysis or event belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Cluster-wide drain.
    Global,
    /// Drain of a single worker.
    Worker(Arc<str>),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Global => f.write_str("global"),
            Scope::Worker(name) => write!(f, "worker:{name}"),
        }
    }
}

/// # Errors produced by the drain runtime.
///
/// Every variant is recoverable:
/// - `ConfigPersist`: in-memory settings stay applied, the operator must retry.
/// - `ConfigLoad`: raised only while building the runtime.
/// - `AnalysisFailure`: the `analyzing` flag is cleared, partial results are kept.
/// - `PlacementQuery`: the worker is treated as unable to take the item (fail closed).
/// - `OfflineTransition`: the worker stays draining.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DrainError {
    /// Settings were applied in memory but could not be written to the store.
    #[error("failed to persist shutdown settings: {source}")]
    ConfigPersist {
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// Settings could not be loaded at startup.
    #[error("failed to load shutdown settings: {source}")]
    ConfigLoad {
        /// Underlying store failure.
        #[source]
        source: StoreError,
    },

    /// The background snapshot analysis panicked or was aborted.
    #[error("snapshot analysis ({scope}) failed: {reason}")]
    AnalysisFailure {
        /// Drain the analysis was computed for.
        scope: Scope,
        /// Panic payload or join error.
        reason: String,
    },

    /// The substrate's placement test errored.
    #[error("placement query for item {item} on worker {worker} failed: {source}")]
    PlacementQuery {
        /// Worker whose placement test failed.
        worker: Arc<str>,
        /// Item being placed.
        item: WorkItemId,
        /// Substrate failure.
        #[source]
        source: SubstrateError,
    },

    /// The substrate refused to take a worker offline.
    #[error("failed to take worker {worker} offline: {source}")]
    OfflineTransition {
        /// Worker that should have gone offline.
        worker: Arc<str>,
        /// Substrate failure.
        #[source]
        source: SubstrateError,
    },
}

impl DrainError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use draingate::{DrainError, Scope};
    ///
    /// let err = DrainError::AnalysisFailure { scope: Scope::Global, reason: "boom".into() };
    /// assert_eq!(err.as_label(), "analysis_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DrainError::ConfigPersist { .. } => "config_persist_failed",
            DrainError::ConfigLoad { .. } => "config_load_failed",
            DrainError::AnalysisFailure { .. } => "analysis_failed",
            DrainError::PlacementQuery { .. } => "placement_query_failed",
            DrainError::OfflineTransition { .. } => "offline_transition_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            DrainError::ConfigPersist { source } => format!("persist: {source}"),
            DrainError::ConfigLoad { source } => format!("load: {source}"),
            DrainError::AnalysisFailure { scope, reason } => {
                format!("analysis scope={scope}: {reason}")
            }
            DrainError::PlacementQuery {
                worker,
                item,
                source,
            } => format!("placement worker={worker} item={item}: {source}"),
            DrainError::OfflineTransition { worker, source } => {
                format!("offline worker={worker}: {source}")
            }
        }
    }
}

//! # Runtime events emitted by the drain coordinator.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Global drain**: activation, deactivation, snapshot analysis progress
//! - **Worker drain**: drain requests, settle timers, offline transitions
//! - **Configuration**: settings updates and persistence failures
//! - **Subscriber**: overflow and panics inside subscriber workers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, worker
//! name, the requesting user, reasons, counts and settle delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use draingate::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SettleScheduled)
//!     .with_worker("agent-7")
//!     .with_delay(Duration::from_secs(10));
//!
//! assert_eq!(ev.kind, EventKind::SettleScheduled);
//! assert_eq!(ev.worker.as_deref(), Some("agent-7"));
//! assert_eq!(ev.delay_ms, Some(10_000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Global drain ===
    /// Global drain turned on.
    ///
    /// Sets:
    /// - `user`: operator who activated it (if known)
    /// - `reason`: the drain message shown on blocked items
    ShutdownActivated,

    /// Global drain turned off. Carries no metadata.
    ShutdownDeactivated,

    /// Snapshot analysis started.
    ///
    /// Sets:
    /// - `worker`: worker name for a per-worker analysis; absent for global
    AnalysisStarted,

    /// Snapshot analysis finished and its results were published.
    ///
    /// Sets:
    /// - `worker`: as for `AnalysisStarted`
    /// - `count`: size of the permitted set after publishing
    AnalysisCompleted,

    /// Snapshot analysis panicked or was aborted. Partial results were kept.
    ///
    /// Sets:
    /// - `worker`: as for `AnalysisStarted`
    /// - `reason`: failure description
    AnalysisFailed,

    // === Worker drain ===
    /// Lenient drain of a worker was requested and the worker is now draining.
    ///
    /// Sets:
    /// - `worker`, `user`
    WorkerDrainRequested,

    /// Worker was taken offline.
    ///
    /// Sets:
    /// - `worker`, `user`
    /// - `reason`: the offline cause message
    WorkerOffline,

    /// Worker drain was cancelled by an operator.
    ///
    /// Sets:
    /// - `worker`
    WorkerDrainCancelled,

    /// Worker came back online; any drain state was discarded.
    ///
    /// Sets:
    /// - `worker`
    WorkerReset,

    /// Settle re-check scheduled after a completion on a draining worker.
    ///
    /// Sets:
    /// - `worker`
    /// - `delay_ms`: settle delay
    SettleScheduled,

    // === Configuration ===
    /// Shutdown settings changed and were persisted.
    ConfigUpdated,

    /// Shutdown settings changed in memory but could not be persisted.
    ///
    /// Sets:
    /// - `reason`: store error
    ConfigPersistFailed,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `reason`: `subscriber=<name> reason=<full|closed>`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `reason`: `subscriber=<name> panic=<message>`
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker the event concerns, if any.
    pub worker: Option<Arc<str>>,
    /// Operator that triggered the event, if known.
    pub user: Option<Arc<str>>,
    /// Human-readable reason (errors, messages, overflow details).
    pub reason: Option<Arc<str>>,
    /// Set size or item count.
    pub count: Option<usize>,
    /// Settle delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            user: None,
            reason: None,
            count: None,
            delay_ms: None,
        }
    }

    /// Attaches a worker name.
    #[inline]
    pub fn with_worker(mut self, worker: impl Into<Arc<str>>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    /// Attaches a worker name when one is given.
    #[inline]
    pub fn with_worker_opt(mut self, worker: Option<Arc<str>>) -> Self {
        self.worker = worker;
        self
    }

    /// Attaches the operator name; `Unknown` users are left unset.
    #[inline]
    pub fn with_user(mut self, user: &crate::UserRef) -> Self {
        self.user = user.name().cloned();
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a count.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Attaches a settle delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} panic={info}"))
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

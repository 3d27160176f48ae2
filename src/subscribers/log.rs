//! # Logging subscriber.
//!
//! [`LogWriter`] forwards drain events to `tracing`, one line per event.
//!
//! ## Output format (fmt subscriber)
//! ```text
//! INFO drain activated user=ops reason="Going to shut down"
//! INFO analysis completed worker=None permitted=12
//! INFO settle re-check scheduled worker=agent-7 delay_ms=10000
//! WARN analysis failed worker=None reason="queue scan exploded"
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Logging subscriber backed by `tracing`.
///
/// Enabled via the `logging` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

impl LogWriter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.as_deref();
        let user = e.user.as_deref();
        let reason = e.reason.as_deref();
        match e.kind {
            EventKind::ShutdownActivated => info!(seq = e.seq, ?user, ?reason, "drain activated"),
            EventKind::ShutdownDeactivated => info!(seq = e.seq, ?user, "drain deactivated"),
            EventKind::AnalysisStarted => debug!(seq = e.seq, ?worker, "analysis started"),
            EventKind::AnalysisCompleted => {
                info!(seq = e.seq, ?worker, permitted = e.count, "analysis completed")
            }
            EventKind::AnalysisFailed => warn!(seq = e.seq, ?worker, ?reason, "analysis failed"),
            EventKind::WorkerDrainRequested => {
                info!(seq = e.seq, ?worker, ?user, "worker draining")
            }
            EventKind::WorkerOffline => {
                info!(seq = e.seq, ?worker, ?user, ?reason, "worker taken offline")
            }
            EventKind::WorkerDrainCancelled => {
                info!(seq = e.seq, ?worker, "worker drain cancelled")
            }
            EventKind::WorkerReset => debug!(seq = e.seq, ?worker, "worker drain state reset"),
            EventKind::SettleScheduled => debug!(
                seq = e.seq,
                ?worker,
                delay_ms = e.delay_ms,
                "settle re-check scheduled"
            ),
            EventKind::ConfigUpdated => debug!(seq = e.seq, "settings updated"),
            EventKind::ConfigPersistFailed => {
                warn!(seq = e.seq, ?reason, "settings not persisted")
            }
            EventKind::SubscriberOverflow => warn!(seq = e.seq, ?reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => warn!(seq = e.seq, ?reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

//! Drain events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Drain` (toggles, worker drains, config), `SnapshotAnalyzer`,
//!   `IdleDrainWatcher` settle timers, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Drain::subscriber_listener()` fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};

//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and, behind the `logging` feature, the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//!   Drain / Analyzer / Watcher ── publish(Event) ──► Bus ──► subscriber_listener
//!                                                                │
//!                                                          SubscriberSet::emit
//!                                                     ┌──────────┼──────────┐
//!                                                     ▼          ▼          ▼
//!                                                 LogWriter   Audit     Custom ...
//! ```
//!
//! ## Implementing custom subscribers
//! ```no_run
//! use draingate::{Event, EventKind, Subscribe};
//! use async_trait::async_trait;
//!
//! struct PagerSubscriber;
//!
//! #[async_trait]
//! impl Subscribe for PagerSubscriber {
//!     async fn on_event(&self, event: &Event) {
//!         if event.kind == EventKind::AnalysisFailed {
//!             // page the on-call operator
//!         }
//!     }
//!     fn name(&self) -> &'static str { "pager" }
//! }
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;

pub(crate) use set::panic_message;

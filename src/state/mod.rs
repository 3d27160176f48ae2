//! Live drain state.
//!
//! - [`ShutdownState`]: the single cluster-wide drain
//! - [`WorkerShutdownState`]: one per worker, created on first reference
//! - [`WorkerStates`]: registry of worker states keyed by name
//!
//! Global and per-worker states use independent locks; no operation holds more
//! than one of them at a time.

mod global;
mod registry;
mod worker;

pub use global::ShutdownState;
pub use registry::WorkerStates;
pub use worker::{WorkerPhase, WorkerShutdownState};


//! Drain coordinator: construction, wiring and substrate hooks.
//!
//! The public API from this module is [`Drain`], built with [`DrainBuilder`]
//! and driven by the substrate through [`DrainHooks`].
//!
//! Internal modules:
//! - [`drain`]: owns state, policy, analyzer, watcher and the event plumbing;
//! - [`builder`]: resolves the settings store and wires components;
//! - [`hooks`]: the interface the substrate adapter calls.

mod builder;
mod drain;
mod hooks;

#[cfg(test)]
mod tests;

pub use builder::DrainBuilder;
pub use drain::{ActivateOptions, Drain};
pub use hooks::DrainHooks;

//! # Runtime configuration.
//!
//! Provides [`Config`] centralized settings for the drain runtime. Unlike
//! [`ShutdownSettings`](crate::ShutdownSettings) these are not persisted; they
//! are fixed when the [`Drain`](crate::Drain) is built.
//!
//! ## Sentinel values
//! - `config_path = None` → settings live in a volatile in-memory store
//! - `bus_capacity = 0` → clamped to 1

use std::path::PathBuf;
use std::time::Duration;

/// Global configuration for the drain runtime.
///
/// ## Field semantics
/// - `settle_delay`: wait between a completion on a draining worker and the idle re-check
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `config_path`: JSON file backing the persisted shutdown settings
#[derive(Clone, Debug)]
pub struct Config {
    /// Delay before a draining worker is re-checked for idleness after a completion.
    ///
    /// One timer per worker: completions arriving while the timer is armed do
    /// not re-arm it, the pending check simply observes the latest state.
    pub settle_delay: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Location of the persisted shutdown settings.
    pub config_path: Option<PathBuf>,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `settle_delay = 10s`
    /// - `bus_capacity = 1024`
    /// - `config_path = None` (volatile settings)
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(10),
            bus_capacity: 1024,
            config_path: None,
        }
    }
}

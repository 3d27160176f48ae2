//! Configuration: runtime knobs and persisted shutdown policy.
//!
//! ## Contents
//! - [`Config`] runtime settings fixed at build time (settle delay, bus capacity, settings path)
//! - [`ShutdownSettings`] persisted operator policy (message, allow flags, whitelist)
//! - [`ShutdownConfiguration`] shared owner of the live settings
//! - [`ConfigStore`] persistence backends ([`JsonFileStore`], [`MemoryStore`])

mod runtime;
mod shutdown;
mod store;

pub use runtime::Config;
pub use shutdown::{DEFAULT_MESSAGE, ShutdownConfiguration, ShutdownSettings, parse_project_list};
pub use store::{ConfigStore, JsonFileStore, MemoryStore};

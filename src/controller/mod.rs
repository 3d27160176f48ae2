//! Operator surface: permission-checked commands and a status snapshot.
//!
//! - [`Controller`] wraps a [`Drain`](crate::Drain) with command semantics;
//! - [`PermissionGate`] decides who may run them ([`AllowAll`] by default);
//! - [`DrainStatus`] is the printable snapshot returned by `status()`.

mod commands;
mod error;
mod gate;
mod status;

pub use commands::{CommandOutcome, Controller};
pub use error::ControlError;
pub use gate::{Action, AllowAll, PermissionGate};
pub use status::{BlockedItem, DrainStatus};

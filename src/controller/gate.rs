use crate::substrate::UserRef;

/// Operator action subject to a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Turn the global drain on or off, or change its settings.
    ManageShutdown,
    /// Drain a worker or cancel its drain.
    DisconnectWorker,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::ManageShutdown => "manage_shutdown",
            Action::DisconnectWorker => "disconnect_worker",
        }
    }
}

/// Decides whether a user may perform an operator action.
///
/// Implementations answer from in-memory state; the check runs on every
/// mutating command.
pub trait PermissionGate: Send + Sync + 'static {
    fn permits(&self, user: &UserRef, action: Action) -> bool;
}

/// Gate that permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl PermissionGate for AllowAll {
    fn permits(&self, _user: &UserRef, _action: Action) -> bool {
        true
    }
}

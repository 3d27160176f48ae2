//! # Admission outcomes.
//!
//! An admission check answers "may this work item run now?". The answer is
//! recomputed on every check and never stored; [`Grant`] names *why* an item
//! was let through and [`Blockage`] renders the reason the substrate shows on
//! a blocked item.

use std::fmt;
use std::sync::Arc;

/// Why an item was allowed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
    /// No drain applies to this scope.
    Inactive,
    /// The item's job kind is not subject to draining.
    NotApplicable,
    /// The item itself was already permitted (queued or running at analysis
    /// time, or allowed by an earlier check).
    Preexisting,
    /// A direct upstream item is permitted: a continuation of old work.
    Upstream,
    /// The project is whitelisted, or a direct upstream item was let through
    /// by the whitelist.
    Whitelisted,
}

/// Why an item was blocked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Blockage {
    /// The cluster-wide drain is active. Carries the configured message.
    GlobalShutdown {
        /// Message shown to users on the blocked item.
        message: Arc<str>,
    },
    /// The worker is draining and the item either can run elsewhere or is not
    /// a continuation of work pinned to it.
    NodeShutdown {
        /// Draining worker.
        worker: Arc<str>,
    },
}

impl Blockage {
    /// Reason string shown on the blocked item.
    pub fn reason(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Blockage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Blockage::GlobalShutdown { message } => f.write_str(message),
            Blockage::NodeShutdown { worker } => {
                write!(f, "{worker} is shutting down leniently")
            }
        }
    }
}

/// Result of one admission check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Allow(Grant),
    Block(Blockage),
}

impl Admission {
    #[inline]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow(_))
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        !self.is_allowed()
    }

    pub fn grant(&self) -> Option<Grant> {
        match self {
            Admission::Allow(grant) => Some(*grant),
            Admission::Block(_) => None,
        }
    }

    pub fn blockage(&self) -> Option<&Blockage> {
        match self {
            Admission::Allow(_) => None,
            Admission::Block(blockage) => Some(blockage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons() {
        let global = Blockage::GlobalShutdown {
            message: "Maintenance at 18:00".into(),
        };
        assert_eq!(global.reason(), "Maintenance at 18:00");

        let node = Blockage::NodeShutdown {
            worker: "agent-3".into(),
        };
        assert_eq!(node.reason(), "agent-3 is shutting down leniently");
    }

    #[test]
    fn accessors() {
        let allow = Admission::Allow(Grant::Upstream);
        assert!(allow.is_allowed());
        assert_eq!(allow.grant(), Some(Grant::Upstream));
        assert!(allow.blockage().is_none());

        let block = Admission::Block(Blockage::NodeShutdown { worker: "w".into() });
        assert!(block.is_blocked());
        assert!(block.grant().is_none());
    }
}

//! # Per-worker state registry.
//!
//! Maps worker names to their [`WorkerShutdownState`], created lazily on first
//! reference. Each worker state has its own lock; the registry lock is held only
//! to look up or insert an entry, never across a state mutation.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::worker::{WorkerPhase, WorkerShutdownState};

/// Lazily-populated map of worker drain states.
#[derive(Default)]
pub struct WorkerStates {
    states: RwLock<HashMap<String, Arc<WorkerShutdownState>>>,
}

impl WorkerStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state for `name`, creating it on first reference.
    pub fn get_or_create(&self, name: &str) -> Arc<WorkerShutdownState> {
        if let Some(state) = self.get(name) {
            return state;
        }
        let mut states = self.states.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            states
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(WorkerShutdownState::new(name))),
        )
    }

    /// Returns the state for `name` without creating it.
    pub fn get(&self, name: &str) -> Option<Arc<WorkerShutdownState>> {
        self.states
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Phase of `name`; workers never referenced are `Active`.
    pub fn phase(&self, name: &str) -> WorkerPhase {
        self.get(name).map(|s| s.phase()).unwrap_or_default()
    }

    pub fn is_draining(&self, name: &str) -> bool {
        self.phase(name).is_draining()
    }

    /// Sorted names of workers currently draining.
    pub fn draining(&self) -> Vec<String> {
        let states = self.states.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = states
            .iter()
            .filter(|(_, s)| s.is_active())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::substrate::UserRef;

    #[test]
    fn lazily_created_and_shared() {
        let registry = WorkerStates::new();
        assert!(registry.get("w1").is_none());
        assert_eq!(registry.phase("w1"), WorkerPhase::Active);

        let a = registry.get_or_create("w1");
        let b = registry.get_or_create("w1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(&**a.name(), "w1");
    }

    #[test]
    fn draining_is_sorted() {
        let registry = WorkerStates::new();
        registry.get_or_create("w2").begin_drain(UserRef::Unknown);
        registry.get_or_create("w0").begin_drain(UserRef::Unknown);
        registry.get_or_create("w1");
        registry.get_or_create("w3").mark_offline(UserRef::Unknown);

        assert_eq!(registry.draining(), vec!["w0", "w2"]);
        assert!(registry.is_draining("w2"));
        assert!(!registry.is_draining("w3"));
    }
}

//! # Persisted shutdown policy.
//!
//! [`ShutdownSettings`] holds the operator-controlled knobs; [`ShutdownConfiguration`]
//! is the shared, lock-protected owner of the live value and of the store it is
//! persisted to.
//!
//! ## Rules
//! - Updates apply in memory first, then persist. A failed persist is reported
//!   (`DrainError::ConfigPersist`) but never rolled back; the operator retries.
//! - Updates are serialized end to end: the last value saved is always the
//!   live value. Readers are not held up by a save in progress.
//! - Whitelisted project names are kept in a `BTreeSet` so the stored file is
//!   ordered deterministically.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::ConfigStore;
use crate::error::DrainError;
use crate::substrate::{JobKind, JobRef};

/// Default banner shown while a global drain is active.
pub const DEFAULT_MESSAGE: &str = "Going to shut down";

/// Operator-controlled drain policy, persisted across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownSettings {
    /// Message shown to users and used as the global blockage reason.
    pub message: String,
    /// Permit every item that was queued when the drain started.
    pub allow_all_queued_items: bool,
    /// Permit items of whitelisted projects regardless of their causal chain.
    pub allow_whitelisted_projects: bool,
    /// Apply drain admission to every job kind, not only classic projects.
    pub allow_all_job_kinds: bool,
    /// Project names exempt from blocking.
    pub whitelisted_projects: BTreeSet<String>,
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            message: DEFAULT_MESSAGE.to_string(),
            allow_all_queued_items: false,
            allow_whitelisted_projects: false,
            allow_all_job_kinds: false,
            whitelisted_projects: BTreeSet::new(),
        }
    }
}

impl ShutdownSettings {
    /// Whether drain admission applies to items of `job` at all.
    ///
    /// Items for which this returns false are never blocked.
    pub fn is_applicable(&self, job: &JobRef) -> bool {
        match job.kind {
            JobKind::Project => true,
            JobKind::Job => self.allow_all_job_kinds,
            JobKind::Task => false,
        }
    }

    /// True iff whitelisting is enabled and `name` is on the whitelist.
    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.allow_whitelisted_projects && self.whitelisted_projects.contains(name)
    }
}

/// Splits a project list as entered by an operator.
///
/// The management form uses one project per line (`\n` or `\r\n`), the command
/// line uses `;`. Entries are trimmed and empty entries dropped.
///
/// # Example
/// ```
/// use draingate::parse_project_list;
///
/// let names = parse_project_list("core\r\n  docs \n\n", '\n');
/// assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["core", "docs"]);
///
/// let names = parse_project_list("a;b;;c", ';');
/// assert_eq!(names.len(), 3);
/// ```
pub fn parse_project_list(text: &str, separator: char) -> BTreeSet<String> {
    text.split(separator)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Shared owner of the live [`ShutdownSettings`].
pub struct ShutdownConfiguration {
    settings: RwLock<ShutdownSettings>,
    store: Arc<dyn ConfigStore>,
    // held across apply and save so the store sees updates in memory order
    save_guard: Mutex<()>,
}

impl ShutdownConfiguration {
    /// Loads settings from `store`, falling back to defaults when nothing is stored.
    pub fn load(store: Arc<dyn ConfigStore>) -> Result<Self, DrainError> {
        let settings = store
            .load()
            .map_err(|source| DrainError::ConfigLoad { source })?
            .unwrap_or_default();
        Ok(Self {
            settings: RwLock::new(settings),
            store,
            save_guard: Mutex::new(()),
        })
    }

    /// Clone of the current settings.
    pub fn settings(&self) -> ShutdownSettings {
        self.read(ShutdownSettings::clone)
    }

    pub fn message(&self) -> String {
        self.read(|s| s.message.clone())
    }

    pub fn allow_all_queued_items(&self) -> bool {
        self.read(|s| s.allow_all_queued_items)
    }

    /// See [`ShutdownSettings::is_applicable`].
    pub fn is_applicable(&self, job: &JobRef) -> bool {
        self.read(|s| s.is_applicable(job))
    }

    /// See [`ShutdownSettings::is_whitelisted`].
    pub fn is_whitelisted(&self, name: &str) -> bool {
        self.read(|s| s.is_whitelisted(name))
    }

    /// Whitelist rendered one project per line, sorted.
    pub fn whitelist_text(&self) -> String {
        self.read(|s| {
            s.whitelisted_projects
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    /// Applies `f` to the live settings and persists the result.
    ///
    /// The in-memory value is updated even if persisting fails.
    pub fn update<F>(&self, f: F) -> Result<(), DrainError>
    where
        F: FnOnce(&mut ShutdownSettings),
    {
        let _saving = self.save_guard.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            f(&mut settings);
            settings.clone()
        };

        match self.store.save(&snapshot) {
            Ok(()) => {
                debug!(
                    allow_all_queued = snapshot.allow_all_queued_items,
                    allow_whitelisted = snapshot.allow_whitelisted_projects,
                    whitelisted = snapshot.whitelisted_projects.len(),
                    "shutdown settings persisted"
                );
                Ok(())
            }
            Err(source) => {
                warn!(
                    label = source.as_label(),
                    error = %source,
                    "shutdown settings applied in memory but not persisted"
                );
                Err(DrainError::ConfigPersist { source })
            }
        }
    }

    fn read<T>(&self, f: impl FnOnce(&ShutdownSettings) -> T) -> T {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        f(&settings)
    }
}

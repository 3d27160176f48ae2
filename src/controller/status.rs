use std::fmt;

use crate::core::Drain;
use crate::substrate::WorkItemId;

/// A pending item the substrate currently reports as blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedItem {
    pub id: WorkItemId,
    pub job: String,
    pub reason: String,
}

/// Point-in-time view of the drain, for operator tooling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainStatus {
    pub active: bool,
    pub analyzing: bool,
    pub message: String,
    pub allow_all_queued_items: bool,
    pub allow_whitelisted_projects: bool,
    pub whitelisted_projects: Vec<String>,
    /// Sorted names of draining workers.
    pub draining_workers: Vec<String>,
    /// Items permitted as old work.
    pub permitted: usize,
    /// Permitted items that have not completed yet.
    pub outstanding: usize,
    pub blocked: Vec<BlockedItem>,
}

impl DrainStatus {
    pub(crate) fn capture(drain: &Drain) -> Self {
        let settings = drain.config().settings();
        let state = drain.state();
        let blocked = drain
            .substrate()
            .pending_items()
            .into_iter()
            .filter_map(|item| {
                item.blocked.map(|reason| BlockedItem {
                    id: item.id,
                    job: item.job.name.to_string(),
                    reason: reason.to_string(),
                })
            })
            .collect();

        Self {
            active: state.is_active(),
            analyzing: state.is_analyzing(),
            message: settings.message,
            allow_all_queued_items: settings.allow_all_queued_items,
            allow_whitelisted_projects: settings.allow_whitelisted_projects,
            whitelisted_projects: settings.whitelisted_projects.into_iter().collect(),
            draining_workers: drain.draining_workers(),
            permitted: state.permitted_ids().len(),
            outstanding: state.active_ids().len(),
            blocked,
        }
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

impl fmt::Display for DrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match (self.active, self.analyzing) {
            (false, _) => "inactive",
            (true, true) => "active (analyzing)",
            (true, false) => "active",
        };
        writeln!(f, "shutdown: {phase}")?;
        writeln!(f, "message: {}", self.message)?;
        writeln!(
            f,
            "allow all queued items: {}",
            yes_no(self.allow_all_queued_items)
        )?;
        writeln!(
            f,
            "whitelist: {} [{}]",
            if self.allow_whitelisted_projects {
                "enabled"
            } else {
                "disabled"
            },
            self.whitelisted_projects.join(", ")
        )?;
        writeln!(
            f,
            "permitted: {} ({} outstanding)",
            self.permitted, self.outstanding
        )?;
        if self.draining_workers.is_empty() {
            writeln!(f, "draining workers: none")?;
        } else {
            writeln!(f, "draining workers: {}", self.draining_workers.join(", "))?;
        }
        if self.blocked.is_empty() {
            return writeln!(f, "blocked: none");
        }
        writeln!(f, "blocked:")?;
        for item in &self.blocked {
            writeln!(f, "  {} {}: {}", item.id, item.job, item.reason)?;
        }
        Ok(())
    }
}

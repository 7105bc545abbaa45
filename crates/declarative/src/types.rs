//! Core types shared by providers, the executor, and reporting

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::Output;

use crate::notify::Timing;
use crate::resource::Action;

/// Current or desired state of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource does not exist/is not configured
    Absent,
    /// Resource exists but differs from desired
    Modified { from: String, to: String },
    /// State cannot be determined
    Unknown,
}

impl ResourceState {
    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. } | Self::Modified { .. })
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// What a provider did (or would do, in why-run) for one action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// Already in the desired state
    NoChange,
    /// Resource was created
    Created,
    /// Resource was modified
    Modified,
    /// Resource was removed
    Removed,
    /// A command or service action was executed
    Ran,
}

impl ApplyResult {
    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::NoChange)
    }
}

impl fmt::Display for ApplyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoChange => "up to date",
            Self::Created => "created",
            Self::Modified => "updated",
            Self::Removed => "removed",
            Self::Ran => "ran",
        };
        f.write_str(s)
    }
}

/// Per-action outcome recorded in the run report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceOutcome {
    /// Nothing needed doing
    Unchanged,
    /// The host was changed (or would be, in why-run)
    Converged { result: ApplyResult },
    /// A guard blocked the action, or the action was `nothing`
    Skipped { reason: String },
    /// The provider failed; `ignored` is set for `ignore_failure` resources
    Failed { error: String, ignored: bool },
}

impl ResourceOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, Self::Converged { .. })
    }

    /// A failure that aborts the run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Failed { ignored: false, .. })
    }
}

/// One line of the per-resource run log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    /// `type[name]` of the resource
    pub resource: String,
    pub action: Action,
    pub outcome: ResourceOutcome,
    /// Set when the action ran because of a notification
    pub notified_by: Option<String>,
}

/// Terminal state of a queued notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationState {
    Fired,
    Discarded,
}

/// A notification as it was handled during the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub source: String,
    pub target: String,
    pub action: Action,
    pub timing: Timing,
    pub state: NotificationState,
}

/// Final status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Success,
    Failed { resource: String, error: String },
}

/// Counters over a run's action records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub unchanged: usize,
    pub converged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    /// Total number of actions evaluated
    pub fn total(&self) -> usize {
        self.unchanged + self.converged + self.skipped + self.failed
    }

    /// Add an outcome to the summary
    pub fn add_outcome(&mut self, outcome: &ResourceOutcome) {
        match outcome {
            ResourceOutcome::Unchanged => self.unchanged += 1,
            ResourceOutcome::Converged { .. } => self.converged += 1,
            ResourceOutcome::Skipped { .. } => self.skipped += 1,
            ResourceOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Complete result of one convergence run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub actions: Vec<ActionRecord>,
    pub notifications: Vec<NotificationRecord>,
    pub status: RunStatus,
    pub why_run: bool,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn summary(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        for record in &self.actions {
            summary.add_outcome(&record.outcome);
        }
        summary
    }

    /// Records for one resource, in the order they happened
    pub fn records_for<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a ActionRecord> + 'a {
        self.actions.iter().filter(move |r| r.resource == key)
    }

    /// Whether any record for `key` ran `action`
    pub fn ran(&self, key: &str, action: Action) -> bool {
        self.records_for(key)
            .any(|r| r.action == action && r.outcome.is_converged())
    }
}

/// Output from an external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub code: Option<i32>,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            code: output.status.code(),
        }
    }
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

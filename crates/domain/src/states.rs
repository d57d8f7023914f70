//! Per-file outcomes, per-target scheduler states, and pass summaries.

use crate::primitives::TargetId;
use serde::{Deserialize, Serialize};

/// Result of comparing one remote file against local state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum SyncOutcome {
    /// Local copy is current.
    Unchanged,
    /// No local copy exists.
    New,
    /// Remote copy is strictly newer.
    Updated,
    /// The file could not be classified or fetched.
    Failed {
        /// Human-readable reason.
        reason: Box<str>,
    },
}

impl SyncOutcome {
    /// Build a failure outcome.
    pub fn failed(reason: impl Into<Box<str>>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// The change to fetch and notify, if any.
    #[must_use]
    pub const fn change(&self) -> Option<ChangeKind> {
        match self {
            Self::New => Some(ChangeKind::New),
            Self::Updated => Some(ChangeKind::Updated),
            Self::Unchanged | Self::Failed { .. } => None,
        }
    }
}

/// A change that produced a download, as reported to the notifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// First copy of a remote file.
    New,
    /// Replacement of an older local copy.
    Updated,
}

/// Scheduler lifecycle of one target worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetState {
    /// Configured but not started.
    Idle,
    /// Cycling passes.
    Running,
    /// Stop requested; finishing the in-flight pass.
    Stopping,
    /// Worker exited.
    Stopped,
}

/// Counts for one completed pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// Target the pass ran for.
    pub target: Option<TargetId>,
    /// Files discovered across all remote roots.
    pub discovered: u64,
    /// Files already current.
    pub unchanged: u64,
    /// Files fetched for the first time.
    pub new: u64,
    /// Files re-fetched because the remote copy was newer.
    pub updated: u64,
    /// Files skipped because of timestamp or fetch failures.
    pub failed: u64,
    /// Remote roots or subtrees that could not be listed.
    pub skipped_dirs: u64,
    /// Bytes written to local storage.
    pub bytes: u64,
    /// Wall-clock duration of the pass in milliseconds.
    pub elapsed_ms: u64,
}

impl PassReport {
    /// Empty report for `target`.
    #[must_use]
    pub fn for_target(target: TargetId) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    /// Tally one per-file outcome.
    pub fn record(&mut self, outcome: &SyncOutcome) {
        let slot = match outcome {
            SyncOutcome::Unchanged => &mut self.unchanged,
            SyncOutcome::New => &mut self.new,
            SyncOutcome::Updated => &mut self.updated,
            SyncOutcome::Failed { .. } => &mut self.failed,
        };
        *slot = slot.saturating_add(1);
    }

    /// Number of files downloaded during the pass.
    #[must_use]
    pub const fn fetched(&self) -> u64 {
        self.new.saturating_add(self.updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_map_to_changes() {
        assert_eq!(SyncOutcome::New.change(), Some(ChangeKind::New));
        assert_eq!(SyncOutcome::Updated.change(), Some(ChangeKind::Updated));
        assert_eq!(SyncOutcome::Unchanged.change(), None);
        assert_eq!(SyncOutcome::failed("mdtm").change(), None);
    }

    #[test]
    fn report_tallies_outcomes() {
        let mut report = PassReport::for_target(TargetId::screenshots());
        for outcome in [
            SyncOutcome::New,
            SyncOutcome::Updated,
            SyncOutcome::Unchanged,
            SyncOutcome::failed("x"),
            SyncOutcome::New,
        ] {
            report.record(&outcome);
        }
        assert_eq!(report.fetched(), 3);
        assert_eq!(report.unchanged, 1);
        assert_eq!(report.failed, 1);
    }

    #[test]
    fn outcome_serializes_with_tag() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(SyncOutcome::failed("no timestamp"))?;
        assert_eq!(value.get("outcome").and_then(|v| v.as_str()), Some("failed"));
        assert_eq!(value.get("reason").and_then(|v| v.as_str()), Some("no timestamp"));
        Ok(())
    }
}

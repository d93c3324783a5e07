//! Workflow-dispatch lifecycle attached to a run.
//!
//! An [`Execution`] records one dispatch of an external workflow backend.
//! Its status moves through a strict table:
//!
//! ```text
//! queued -> dispatched -> running -> succeeded
//!    \          \            \----> failed
//!     \          \-----------------> failed
//!      \---------------------------> failed
//! ```
//!
//! Succeeded and failed are terminal. Every status change is checked
//! against the table before anything is persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{Result, StoreError};

/// Where a workflow is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    /// Dispatch through the remote workflow service.
    RemoteWorkflow,
    /// Spawn the workflow as a local process.
    LocalProcess,
}

/// The fixed set of workflows a run can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WorkflowName {
    /// Architecture and plan generation.
    Phase1Planner,
    /// Work decomposition.
    Phase2Decomposer,
    /// Implementation issue synchronization.
    Phase3IssueSync,
}

impl WorkflowName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phase1Planner => "phase1-planner",
            Self::Phase2Decomposer => "phase2-decomposer",
            Self::Phase3IssueSync => "phase3-issue-sync",
        }
    }
}

impl fmt::Display for WorkflowName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single workflow dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Dispatched,
    Running,
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    /// An active execution blocks queueing another one on the same run.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Dispatched | Self::Running)
    }

    /// Terminal states have no outgoing transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// The legal-transition table. No self-loops, nothing out of a
    /// terminal state, and success is only reachable through running.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Dispatched)
                | (Self::Queued, Self::Failed)
                | (Self::Dispatched, Self::Running)
                | (Self::Dispatched, Self::Failed)
                | (Self::Running, Self::Succeeded)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Dispatched => "dispatched",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One workflow dispatch attached to a run.
///
/// A new queued execution replaces a prior terminal one wholesale; the two
/// never merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub backend: ExecutionBackend,
    pub workflow: WorkflowName,
    pub status: ExecutionStatus,
    /// Identifier assigned by the external backend, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_url: Option<String>,
    pub requested_at: DateTime<Utc>,
    /// Set exactly once, the first time the status becomes running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly when the status becomes succeeded or failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Present only when the status is failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Execution {
    /// Build a fresh queued execution.
    pub fn queued(workflow: WorkflowName, backend: ExecutionBackend) -> Self {
        Self {
            backend,
            workflow,
            status: ExecutionStatus::Queued,
            external_id: None,
            external_url: None,
            requested_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a patch, enforcing the transition table and timestamp rules.
    ///
    /// An illegal status change returns `InvalidTransition` without
    /// mutating `self`.
    pub(crate) fn apply(&mut self, patch: &ExecutionPatch, now: DateTime<Utc>) -> Result<()> {
        if let Some(next) = patch.status {
            if !self.status.can_transition_to(next) {
                return Err(StoreError::InvalidTransition {
                    from: self.status,
                    to: next,
                });
            }
            if next == ExecutionStatus::Running && self.started_at.is_none() {
                self.started_at = Some(now);
            }
            if next.is_terminal() {
                self.completed_at = Some(now);
            }
            self.status = next;
            // error_message is written only by the patch that transitions to
            // failed; a status-less patch never touches it, so the first
            // recorded failure reason survives later reports.
            if next == ExecutionStatus::Failed {
                self.error_message = patch.error_message.clone();
            } else {
                self.error_message = None;
            }
        }
        if let Some(id) = &patch.external_id {
            self.external_id = Some(id.clone());
        }
        if let Some(url) = &patch.external_url {
            self.external_url = Some(url.clone());
        }
        Ok(())
    }
}

/// Partial update applied by `update_execution`.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPatch {
    pub status: Option<ExecutionStatus>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub error_message: Option<String>,
}

impl ExecutionPatch {
    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_external_id(mut self, id: &str) -> Self {
        self.external_id = Some(id.to_string());
        self
    }

    pub fn with_external_url(mut self, url: &str) -> Self {
        self.external_url = Some(url.to_string());
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = Some(message.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ExecutionStatus; 5] = [
        ExecutionStatus::Queued,
        ExecutionStatus::Dispatched,
        ExecutionStatus::Running,
        ExecutionStatus::Succeeded,
        ExecutionStatus::Failed,
    ];

    fn queued() -> Execution {
        Execution::queued(WorkflowName::Phase1Planner, ExecutionBackend::LocalProcess)
    }

    #[test]
    fn transition_table_is_exactly_the_six_legal_pairs() {
        let legal = [
            (ExecutionStatus::Queued, ExecutionStatus::Dispatched),
            (ExecutionStatus::Queued, ExecutionStatus::Failed),
            (ExecutionStatus::Dispatched, ExecutionStatus::Running),
            (ExecutionStatus::Dispatched, ExecutionStatus::Failed),
            (ExecutionStatus::Running, ExecutionStatus::Succeeded),
            (ExecutionStatus::Running, ExecutionStatus::Failed),
        ];
        for from in ALL {
            for to in ALL {
                let expected = legal.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "{from} -> {to} should be {expected}"
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        for from in [ExecutionStatus::Succeeded, ExecutionStatus::Failed] {
            assert!(from.is_terminal());
            for to in ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn active_and_terminal_partition_the_states() {
        for status in ALL {
            assert_ne!(status.is_active(), status.is_terminal());
        }
    }

    #[test]
    fn apply_sets_started_at_only_on_first_running() {
        let mut exec = queued();
        let t1 = Utc::now();
        exec.apply(
            &ExecutionPatch::default().with_status(ExecutionStatus::Dispatched),
            t1,
        )
        .unwrap();
        assert!(exec.started_at.is_none());

        let t2 = t1 + chrono::Duration::seconds(5);
        exec.apply(
            &ExecutionPatch::default().with_status(ExecutionStatus::Running),
            t2,
        )
        .unwrap();
        assert_eq!(exec.started_at, Some(t2));
    }

    #[test]
    fn apply_sets_completed_at_on_terminal_status() {
        let mut exec = queued();
        let now = Utc::now();
        exec.apply(
            &ExecutionPatch::default()
                .with_status(ExecutionStatus::Failed)
                .with_error_message("dispatch rejected"),
            now,
        )
        .unwrap();
        assert_eq!(exec.completed_at, Some(now));
        assert_eq!(exec.error_message.as_deref(), Some("dispatch rejected"));
        assert!(exec.started_at.is_none());
    }

    #[test]
    fn apply_rejects_illegal_transition_without_mutation() {
        let mut exec = queued();
        let before = exec.clone();
        let err = exec
            .apply(
                &ExecutionPatch::default().with_status(ExecutionStatus::Succeeded),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: ExecutionStatus::Queued,
                to: ExecutionStatus::Succeeded,
            }
        ));
        assert_eq!(exec, before);
    }

    #[test]
    fn apply_clears_error_message_on_non_failed_status() {
        let mut exec = queued();
        exec.apply(
            &ExecutionPatch::default()
                .with_status(ExecutionStatus::Dispatched)
                .with_error_message("should be ignored"),
            Utc::now(),
        )
        .unwrap();
        assert!(exec.error_message.is_none());
    }

    #[test]
    fn status_less_patch_cannot_overwrite_failure_reason() {
        let mut exec = queued();
        exec.apply(
            &ExecutionPatch::default()
                .with_status(ExecutionStatus::Failed)
                .with_error_message("first reason"),
            Utc::now(),
        )
        .unwrap();

        exec.apply(
            &ExecutionPatch::default().with_error_message("later unrelated report"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(exec.error_message.as_deref(), Some("first reason"));
    }

    #[test]
    fn apply_records_external_reference_without_status_change() {
        let mut exec = queued();
        exec.apply(
            &ExecutionPatch::default()
                .with_external_id("runs/8812")
                .with_external_url("https://workflows.example/runs/8812"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(exec.status, ExecutionStatus::Queued);
        assert_eq!(exec.external_id.as_deref(), Some("runs/8812"));
    }

    #[test]
    fn wire_forms_match_the_persisted_layout() {
        assert_eq!(
            serde_json::to_value(WorkflowName::Phase1Planner).unwrap(),
            serde_json::json!("phase1-planner")
        );
        assert_eq!(
            serde_json::to_value(ExecutionBackend::LocalProcess).unwrap(),
            serde_json::json!("local_process")
        );
        assert_eq!(
            serde_json::to_value(ExecutionStatus::Dispatched).unwrap(),
            serde_json::json!("dispatched")
        );
    }
}

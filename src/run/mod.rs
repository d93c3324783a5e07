//! Run entity model.
//!
//! A [`Run`] is one end-to-end attempt at producing a delivery plan from a
//! planning input. It moves through a fixed sequence of steps (parse →
//! clarify → plan → decompose → approve → export), each driven by an
//! external worker and reported back through the store. The run document is
//! the single source of truth; everything else (index, manifest) is a
//! projection.

pub mod execution;
pub mod store;
pub mod substate;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::errors::{Result, StoreError};
use execution::Execution;
use substate::{
    ArchitectureChatState, DecompositionState, ImplementationIssueStateCollection, RepoState,
};

/// Globally unique run identifier, assigned at creation and immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generate a fresh v4 identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Created,
    Parsed,
    Clarified,
    PlanGenerated,
    DecompositionGenerated,
    Approved,
    Exported,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Parsed => "parsed",
            Self::Clarified => "clarified",
            Self::PlanGenerated => "plan_generated",
            Self::DecompositionGenerated => "decomposition_generated",
            Self::Approved => "approved",
            Self::Exported => "exported",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline step a run is currently at.
///
/// Doubles as the key of the write-once `step_timestamps` map, so it keeps
/// a total order for deterministic serialization.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RunStep {
    #[default]
    Created,
    Parse,
    Clarify,
    Plan,
    Decompose,
    Approve,
    Export,
}

impl RunStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Parse => "parse",
            Self::Clarify => "clarify",
            Self::Plan => "plan",
            Self::Decompose => "decompose",
            Self::Approve => "approve",
            Self::Export => "export",
        }
    }
}

impl fmt::Display for RunStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The original planning input a run was created from. Immutable once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningInput {
    /// Short human-readable title for the plan.
    pub title: String,
    /// Full description of what should be planned.
    pub description: String,
    /// Optional extra context supplied alongside the description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl PlanningInput {
    pub fn new(title: &str, description: &str) -> Self {
        Self {
            title: title.to_string(),
            description: description.to_string(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }
}

/// The root entity: one multi-stage planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub created_at: DateTime<Utc>,
    pub status: RunStatus,
    pub step: RunStep,
    pub last_updated_at: DateTime<Utc>,
    /// First time each step was reached. Entries are write-once: re-reaching
    /// a step never overwrites its original timestamp.
    #[serde(default)]
    pub step_timestamps: BTreeMap<RunStep, DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<PlanningInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution: Option<Execution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<RepoState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture_chat: Option<ArchitectureChatState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decomposition: Option<DecompositionState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation: Option<ImplementationIssueStateCollection>,
}

impl Run {
    /// Build a fresh run at the `created` status and step.
    pub fn new(input: Option<PlanningInput>) -> Self {
        let now = Utc::now();
        let mut step_timestamps = BTreeMap::new();
        step_timestamps.insert(RunStep::Created, now);
        Self {
            id: RunId::new(),
            created_at: now,
            status: RunStatus::Created,
            step: RunStep::Created,
            last_updated_at: now,
            step_timestamps,
            input: None,
            execution: None,
            repo: None,
            architecture_chat: None,
            decomposition: None,
            implementation: None,
        }
        .with_input(input)
    }

    fn with_input(mut self, input: Option<PlanningInput>) -> Self {
        self.input = input;
        self
    }

    /// Record the first time a step was reached. No-op if already recorded.
    pub fn record_step(&mut self, step: RunStep, at: DateTime<Utc>) {
        self.step_timestamps.entry(step).or_insert(at);
    }

    /// Project the run into its index summary.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            id: self.id,
            created_at: self.created_at,
            status: self.status,
            step: self.step,
            last_updated_at: self.last_updated_at,
        }
    }

    /// Structural invariants checked before every persist.
    pub fn validate(&self) -> Result<()> {
        if let Some(exec) = &self.execution {
            if exec.error_message.is_some() && exec.status != execution::ExecutionStatus::Failed {
                return Err(StoreError::validation(
                    format!("run {}", self.id),
                    format!("error_message present on {} execution", exec.status),
                ));
            }
            if exec.completed_at.is_some() != exec.status.is_terminal() {
                return Err(StoreError::validation(
                    format!("run {}", self.id),
                    format!("completed_at inconsistent with {} execution", exec.status),
                ));
            }
            if exec.status == execution::ExecutionStatus::Running && exec.started_at.is_none() {
                return Err(StoreError::validation(
                    format!("run {}", self.id),
                    "running execution has no started_at".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Small projection of a run kept in the run-history index for cheap
/// listing without loading every full document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub id: RunId,
    pub created_at: DateTime<Utc>,
    pub status: RunStatus,
    pub step: RunStep,
    pub last_updated_at: DateTime<Utc>,
}

/// Partial update applied by `update_run`. Absent fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct RunPatch {
    pub status: Option<RunStatus>,
    pub step: Option<RunStep>,
}

impl RunPatch {
    pub fn with_status(mut self, status: RunStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_step(mut self, step: RunStep) -> Self {
        self.step = Some(step);
        self
    }
}

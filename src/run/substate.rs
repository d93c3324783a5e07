//! Auxiliary sub-state documents merged into a run.
//!
//! Each of these is an optional, independently-updatable section of the run
//! document. Updates replace the whole sub-document; there is no
//! field-level merge (last write wins at sub-document granularity).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the delivery repository was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoMode {
    /// A new repository was created for this run.
    CreateNew,
    /// An existing repository was selected.
    UseExisting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoVisibility {
    Public,
    Private,
}

/// The resolved delivery repository for a run.
///
/// Written once repository resolution completes; overwritten wholesale on
/// re-resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoState {
    pub mode: RepoMode,
    /// Free-form provenance of the resolution (who or what picked it).
    pub source: String,
    pub owner: String,
    pub name: String,
    pub url: String,
    pub visibility: RepoVisibility,
    pub default_branch: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One turn of the architecture refinement conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Conversation history behind the generated architecture document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArchitectureChatState {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub updated_at: DateTime<Utc>,
}

/// Where the work decomposition currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecompositionStatus {
    #[default]
    NotStarted,
    Draft,
    Approved,
    Synced,
}

/// Decomposition progress for a run.
///
/// The caller resets this to `not_started` when the architecture changes
/// upstream; the store observes that as a plain overwrite.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecompositionState {
    pub status: DecompositionStatus,
    /// Logical name of the decomposition artifact, once generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_by: Option<String>,
    #[serde(default)]
    pub work_item_count: u32,
}

/// Sync outcome of one work item against the issue tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSyncStatus {
    Pending,
    Created,
    Updated,
    Failed,
}

/// Per-work-item issue sync record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationIssueState {
    pub plan_item_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue_state: Option<String>,
    pub sync_status: IssueSyncStatus,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Result of one full issue-sync pass. Fully replaced each pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImplementationIssueStateCollection {
    pub synced_at: DateTime<Utc>,
    #[serde(default)]
    pub items: Vec<ImplementationIssueState>,
}

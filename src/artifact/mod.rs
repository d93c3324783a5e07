//! Artifact model: named, typed, content-addressed outputs of a run.
//!
//! Each run owns a manifest (`artifacts/index.json`) of
//! [`ArtifactMetadata`] entries, one per logical name. Writing an artifact
//! with an existing name replaces that entry — re-running a stage
//! overwrites its own output without creating duplicates.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, StoreError};

/// Placeholder filename stem when a name normalizes to nothing.
const FALLBACK_FILE_STEM: &str = "artifact";

/// The fixed set of artifact body encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactContentType {
    /// Structured document, pretty-printed on disk.
    Json,
    /// Freeform markdown, written as-is.
    Markdown,
    /// Freeform plain text, written as-is.
    Text,
}

impl ArtifactContentType {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

/// An artifact body on its way in or out of the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactPayload {
    Json(serde_json::Value),
    Text(String),
}

impl ArtifactPayload {
    /// Serialize the payload according to the declared content type.
    ///
    /// The payload kind must match the content type: structured bodies for
    /// `json`, text bodies for `markdown`/`text`.
    pub fn to_bytes(&self, content_type: ArtifactContentType) -> Result<Vec<u8>> {
        match (self, content_type) {
            (Self::Json(value), ArtifactContentType::Json) => {
                let mut bytes = serde_json::to_vec_pretty(value).map_err(|e| {
                    StoreError::validation("artifact payload", e.to_string())
                })?;
                bytes.push(b'\n');
                Ok(bytes)
            }
            (Self::Text(text), ArtifactContentType::Markdown | ArtifactContentType::Text) => {
                Ok(text.as_bytes().to_vec())
            }
            (Self::Json(_), _) => Err(StoreError::validation(
                "artifact payload",
                format!(
                    "structured payload cannot be written as {}",
                    content_type.extension()
                ),
            )),
            (Self::Text(_), ArtifactContentType::Json) => Err(StoreError::validation(
                "artifact payload",
                "text payload cannot be written as json",
            )),
        }
    }
}

/// Manifest entry for one named artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Logical name, unique per run. Upsert key.
    pub name: String,
    /// On-disk filename derived from the name.
    pub file_name: String,
    pub content_type: ArtifactContentType,
    /// `sha256:<hex>` digest of the serialized bytes.
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Artifact manifest document: `{"version": 1, "artifacts": [...]}`.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ArtifactManifest {
    pub(crate) version: u32,
    pub(crate) artifacts: Vec<ArtifactMetadata>,
}

impl ArtifactManifest {
    pub(crate) fn empty() -> Self {
        Self {
            version: 1,
            artifacts: Vec::new(),
        }
    }
}

/// Derive a filesystem-safe file stem from a free-form artifact name.
///
/// Lossy by design: lowercase, keep `[a-z0-9._-]`, collapse any other run
/// of characters into a single `-`, trim separators at the edges. Distinct
/// names can collapse to the same stem; the manifest's logical `name`
/// remains the identity.
pub fn safe_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(ch);
        } else {
            pending_sep = true;
        }
    }
    let trimmed = out.trim_matches(['-', '.']);
    if trimmed.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Total manifest order: newest first, name ascending as tie-break.
pub(crate) fn sort_artifacts(artifacts: &mut [ArtifactMetadata]) {
    artifacts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.name.cmp(&b.name))
    });
}

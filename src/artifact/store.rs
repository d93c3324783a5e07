//! Artifact manifest operations on the run store.
//!
//! Artifact bodies are written independently of the run document but every
//! operation is guarded by a run-existence check. The manifest is the
//! identity map: lookup is by logical name, never by filename.

use std::path::PathBuf;
use tracing::debug;

use crate::errors::{Result, StoreError};
use crate::run::RunId;
use crate::run::store::RunStore;
use crate::storage;

use super::{
    ArtifactContentType, ArtifactManifest, ArtifactMetadata, ArtifactPayload, safe_file_name,
    sort_artifacts,
};

const MANIFEST_FILE: &str = "index.json";

impl RunStore {
    /// Write (or overwrite) a named artifact for a run.
    ///
    /// The body is written atomically, then the manifest entry is upserted
    /// by logical name and the manifest written atomically. Returns the new
    /// metadata.
    pub fn write_artifact(
        &self,
        run_id: RunId,
        name: &str,
        payload: &ArtifactPayload,
        content_type: ArtifactContentType,
    ) -> Result<ArtifactMetadata> {
        self.ensure_run_exists(run_id)?;
        let bytes = payload.to_bytes(content_type)?;
        let file_name = format!("{}.{}", safe_file_name(name), content_type.extension());
        if file_name == MANIFEST_FILE {
            // The manifest lives in the same directory as the bodies; a body
            // landing on its path would destroy the run's artifact store.
            return Err(StoreError::conflict(format!(
                "artifact name {name:?} normalizes to the reserved manifest filename {MANIFEST_FILE}"
            )));
        }

        let dir = self.artifacts_dir(run_id);
        storage::ensure_dir(&dir)?;
        storage::write_bytes_atomic(&dir.join(&file_name), &bytes)?;

        let metadata = ArtifactMetadata {
            name: name.to_string(),
            file_name,
            content_type,
            content_hash: storage::content_hash(&bytes),
            created_at: chrono::Utc::now(),
        };

        let mut manifest = self.load_manifest(run_id)?;
        manifest.artifacts.retain(|entry| entry.name != metadata.name);
        manifest.artifacts.push(metadata.clone());
        sort_artifacts(&mut manifest.artifacts);
        storage::write_document_atomic(&self.manifest_path(run_id), &manifest)?;

        debug!(
            run_id = %run_id,
            name,
            file = %metadata.file_name,
            hash = %metadata.content_hash,
            "wrote artifact"
        );
        Ok(metadata)
    }

    /// Read an artifact body back by its logical name.
    pub fn read_artifact(&self, run_id: RunId, name: &str) -> Result<ArtifactPayload> {
        self.ensure_run_exists(run_id)?;
        let manifest = self.load_manifest(run_id)?;
        let Some(entry) = manifest.artifacts.iter().find(|a| a.name == name) else {
            return Err(StoreError::conflict(format!(
                "no artifact named {name:?} for this run"
            )));
        };

        let path = self.artifacts_dir(run_id).join(&entry.file_name);
        let bytes = storage::read_bytes(&path)?;
        match entry.content_type {
            ArtifactContentType::Json => {
                let value = serde_json::from_slice(&bytes).map_err(|e| {
                    StoreError::validation(path.display().to_string(), e.to_string())
                })?;
                Ok(ArtifactPayload::Json(value))
            }
            ArtifactContentType::Markdown | ArtifactContentType::Text => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    StoreError::validation(path.display().to_string(), e.to_string())
                })?;
                Ok(ArtifactPayload::Text(text))
            }
        }
    }

    /// Current manifest entries for a run, in stored (deterministic) order.
    pub fn list_artifacts(&self, run_id: RunId) -> Result<Vec<ArtifactMetadata>> {
        self.ensure_run_exists(run_id)?;
        Ok(self.load_manifest(run_id)?.artifacts)
    }

    fn manifest_path(&self, run_id: RunId) -> PathBuf {
        self.artifacts_dir(run_id).join(MANIFEST_FILE)
    }

    fn load_manifest(&self, run_id: RunId) -> Result<ArtifactManifest> {
        let mut manifest = match storage::read_document(&self.manifest_path(run_id)) {
            Ok(manifest) => manifest,
            Err(StoreError::NotFound { .. }) => ArtifactManifest::empty(),
            Err(e) => return Err(e),
        };
        sort_artifacts(&mut manifest.artifacts);
        Ok(manifest)
    }
}

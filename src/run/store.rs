//! The run store: canonical run documents plus their history index.
//!
//! One store owns one storage root. Layout:
//!
//! ```text
//! <root>/index.json                      run-history index
//! <root>/<run-id>/run.json               full run document
//! <root>/<run-id>/artifacts/index.json   artifact manifest
//! <root>/<run-id>/artifacts/<name>.*     artifact bodies
//! ```
//!
//! Every mutator goes through [`RunStore::persist`]: stamp
//! `last_updated_at`, validate, write the document atomically, then rebuild
//! the index entry. The run document is always written before its index
//! entry, so the index can never reference a document that does not exist;
//! the reverse drift (document present, index stale) self-heals on the next
//! successful persist of that run.
//!
//! Single-process, single-writer model: no cross-process locking and no
//! per-run in-process mutex. Two concurrent mutations of the same run race
//! at read-modify-write granularity; last successful rename wins.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::errors::{Result, StoreError};
use crate::storage;

use super::execution::{Execution, ExecutionBackend, ExecutionPatch, ExecutionStatus, WorkflowName};
use super::substate::{
    ArchitectureChatState, DecompositionState, ImplementationIssueStateCollection, RepoState,
};
use super::{PlanningInput, Run, RunId, RunPatch, RunSummary};

const RUN_INDEX_FILE: &str = "index.json";
const RUN_DOCUMENT_FILE: &str = "run.json";
pub(crate) const ARTIFACTS_DIR: &str = "artifacts";
const INDEX_VERSION: u32 = 1;

/// Run-history index document: `{"version": 1, "runs": [...]}`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct RunIndex {
    version: u32,
    runs: Vec<RunSummary>,
}

impl RunIndex {
    fn empty() -> Self {
        Self {
            version: INDEX_VERSION,
            runs: Vec::new(),
        }
    }
}

/// Filesystem-backed repository for run documents.
///
/// Construct one per storage root and pass it by reference; there is no
/// ambient singleton.
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    /// Open a store at the configured root, creating it if missing.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Self::at(config.root())
    }

    /// Open a store at an explicit root, creating it if missing.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        storage::ensure_dir(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(RUN_INDEX_FILE)
    }

    fn run_dir(&self, id: RunId) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn run_path(&self, id: RunId) -> PathBuf {
        self.run_dir(id).join(RUN_DOCUMENT_FILE)
    }

    pub(crate) fn artifacts_dir(&self, id: RunId) -> PathBuf {
        self.run_dir(id).join(ARTIFACTS_DIR)
    }

    // -------------------------------------------------------------------
    // Run lifecycle
    // -------------------------------------------------------------------

    /// Create a new run at status `created`, step `created`.
    ///
    /// The run document is written before the index entry.
    pub fn create_run(&self, input: Option<PlanningInput>) -> Result<Run> {
        let run = Run::new(input);
        info!(run_id = %run.id, "creating run");
        storage::ensure_dir(&self.run_dir(run.id))?;
        storage::ensure_dir(&self.artifacts_dir(run.id))?;
        storage::write_document_atomic(&self.run_path(run.id), &run)?;
        self.sync_index_entry(&run)?;
        Ok(run)
    }

    /// Load and validate the full run document.
    pub fn get_run(&self, id: RunId) -> Result<Run> {
        match storage::read_document::<Run>(&self.run_path(id)) {
            Ok(run) => Ok(run),
            Err(StoreError::NotFound { .. }) => Err(StoreError::RunNotFound { id }),
            Err(e) => Err(e),
        }
    }

    /// List run summaries, newest-first, id ascending on equal timestamps.
    pub fn list_runs(&self) -> Result<Vec<RunSummary>> {
        Ok(self.load_index()?.runs)
    }

    /// Merge a status/step patch into the run and persist it.
    ///
    /// A step that has never been reached before gets its first-reached
    /// timestamp recorded; re-reaching a step leaves the original timestamp
    /// in place.
    pub fn update_run(&self, id: RunId, patch: &RunPatch) -> Result<Run> {
        let mut run = self.get_run(id)?;
        if let Some(status) = patch.status {
            run.status = status;
        }
        if let Some(step) = patch.step {
            run.step = step;
            run.record_step(step, Utc::now());
        }
        self.persist(run)
    }

    /// The single choke point for every mutation.
    ///
    /// Stamps `last_updated_at`, validates, writes the document, then
    /// rebuilds the index entry for this run so the document and its
    /// projection never diverge after a successful call.
    fn persist(&self, mut run: Run) -> Result<Run> {
        run.last_updated_at = Utc::now();
        run.validate()?;
        debug!(run_id = %run.id, status = %run.status, step = %run.step, "persisting run");
        storage::write_document_atomic(&self.run_path(run.id), &run)?;
        self.sync_index_entry(&run)?;
        Ok(run)
    }

    fn load_index(&self) -> Result<RunIndex> {
        let mut index = match storage::read_document::<RunIndex>(&self.index_path()) {
            Ok(index) => index,
            Err(StoreError::NotFound { .. }) => RunIndex::empty(),
            Err(e) => return Err(e),
        };
        sort_summaries(&mut index.runs);
        Ok(index)
    }

    /// Remove-then-insert the run's summary, preserving the sort order.
    fn sync_index_entry(&self, run: &Run) -> Result<()> {
        let mut index = self.load_index()?;
        index.runs.retain(|summary| summary.id != run.id);
        index.runs.push(run.summary());
        sort_summaries(&mut index.runs);
        storage::write_document_atomic(&self.index_path(), &index)
    }

    /// Cheap existence check used by artifact operations.
    pub(crate) fn ensure_run_exists(&self, id: RunId) -> Result<()> {
        if self.run_path(id).exists() {
            Ok(())
        } else {
            Err(StoreError::RunNotFound { id })
        }
    }

    // -------------------------------------------------------------------
    // Execution lifecycle
    // -------------------------------------------------------------------

    /// Queue a fresh workflow execution for a run.
    ///
    /// Requires planning input on the run and no active execution; a prior
    /// terminal execution is replaced wholesale.
    pub fn queue_execution(
        &self,
        id: RunId,
        workflow: WorkflowName,
        backend: ExecutionBackend,
    ) -> Result<Run> {
        let mut run = self.get_run(id)?;
        if run.input.is_none() {
            return Err(StoreError::conflict(
                "run has no planning input; cannot queue an execution",
            ));
        }
        if let Some(exec) = &run.execution {
            if exec.is_active() {
                return Err(StoreError::conflict(format!(
                    "an execution is already {} for this run",
                    exec.status
                )));
            }
        }
        info!(run_id = %id, workflow = %workflow, backend = ?backend, "queueing execution");
        run.execution = Some(Execution::queued(workflow, backend));
        self.persist(run)
    }

    /// Shorthand: the backend accepted the dispatch.
    pub fn mark_execution_dispatched(&self, id: RunId) -> Result<Run> {
        self.update_execution(
            id,
            &ExecutionPatch::default().with_status(ExecutionStatus::Dispatched),
        )
    }

    /// Advance the run's execution, enforcing the transition table.
    pub fn update_execution(&self, id: RunId, patch: &ExecutionPatch) -> Result<Run> {
        let mut run = self.get_run(id)?;
        let Some(exec) = run.execution.as_mut() else {
            return Err(StoreError::conflict("run has no execution to update"));
        };
        exec.apply(patch, Utc::now())?;
        if let Some(status) = patch.status {
            info!(run_id = %id, status = %status, "execution transition");
        }
        self.persist(run)
    }

    /// Record a failure report for the run's execution.
    ///
    /// Rejects failing an already-terminal execution so the first recorded
    /// failure reason is never overwritten by a later report.
    pub fn fail_execution(&self, id: RunId, message: &str) -> Result<Run> {
        let mut run = self.get_run(id)?;
        let Some(exec) = run.execution.as_mut() else {
            return Err(StoreError::conflict("run has no execution to fail"));
        };
        if exec.is_terminal() {
            return Err(StoreError::conflict(format!(
                "execution already {}; refusing to overwrite its outcome",
                exec.status
            )));
        }
        exec.apply(
            &ExecutionPatch::default()
                .with_status(ExecutionStatus::Failed)
                .with_error_message(message),
            Utc::now(),
        )?;
        self.persist(run)
    }

    // -------------------------------------------------------------------
    // Auxiliary sub-state
    // -------------------------------------------------------------------

    /// Replace the run's resolved-repository state.
    pub fn update_repo_state(&self, id: RunId, state: RepoState) -> Result<Run> {
        let mut run = self.get_run(id)?;
        run.repo = Some(state);
        self.persist(run)
    }

    /// Replace the run's architecture-chat history.
    pub fn update_architecture_chat_state(
        &self,
        id: RunId,
        state: ArchitectureChatState,
    ) -> Result<Run> {
        let mut run = self.get_run(id)?;
        run.architecture_chat = Some(state);
        self.persist(run)
    }

    /// Replace the run's decomposition state.
    pub fn update_decomposition_state(&self, id: RunId, state: DecompositionState) -> Result<Run> {
        let mut run = self.get_run(id)?;
        run.decomposition = Some(state);
        self.persist(run)
    }

    /// Replace the run's implementation-issue sync state.
    pub fn update_implementation_state(
        &self,
        id: RunId,
        state: ImplementationIssueStateCollection,
    ) -> Result<Run> {
        let mut run = self.get_run(id)?;
        run.implementation = Some(state);
        self.persist(run)
    }
}

/// Total order for the index: newest first, id ascending as tie-break, so
/// listing is deterministic even with identical timestamps.
fn sort_summaries(runs: &mut [RunSummary]) {
    runs.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

//! Blueprint — run lifecycle and persistence engine.
//!
//! Tracks a multi-stage planning run (architecture generation, repository
//! resolution, work decomposition, issue sync) as a durable document on the
//! filesystem, with crash-safe atomic writes, a strict execution state
//! machine, and a per-run artifact manifest. Callers (the API layer, the
//! workflow dispatchers) drive the engine exclusively through
//! [`run::store::RunStore`]; the engine makes no outbound calls of its own.

pub mod artifact;
pub mod config;
pub mod errors;
pub mod run;
pub mod storage;

pub use artifact::{ArtifactContentType, ArtifactMetadata, ArtifactPayload};
pub use config::StoreConfig;
pub use errors::{Result, StoreError};
pub use run::store::RunStore;
pub use run::{PlanningInput, Run, RunId, RunPatch, RunStatus, RunStep, RunSummary};

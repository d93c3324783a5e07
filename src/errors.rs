//! Typed error hierarchy for the run store.
//!
//! `StoreError` is the single error type every engine operation returns.
//! Variants map onto caller-facing outcome classes:
//! - `RunNotFound` / `NotFound` — the run or document is absent (404-class)
//! - `Conflict` — a precondition was violated (409-class)
//! - `InvalidTransition` — illegal execution-status change (400-class)
//! - `Validation` — on-disk bytes or caller input fail shape checks (400-class)
//! - `Io` / `Serialize` — the underlying filesystem or encoder failed

use std::path::PathBuf;
use thiserror::Error;

use crate::run::RunId;
use crate::run::execution::ExecutionStatus;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by the run lifecycle and persistence engine.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run {id} not found")]
    RunNotFound { id: RunId },

    #[error("Document not found at {path}")]
    NotFound { path: PathBuf },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Invalid execution transition: {from} -> {to}")]
    InvalidTransition {
        from: ExecutionStatus,
        to: ExecutionStatus,
    },

    #[error("Validation failed for {subject}: {message}")]
    Validation { subject: String, message: String },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize document for {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Build a `Conflict` from any message.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Build a `Validation` error for a named subject.
    pub fn validation(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            subject: subject.into(),
            message: message.into(),
        }
    }
}

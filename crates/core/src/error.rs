//! Pipeline error model.

use thiserror::Error;

use crate::id::PaperId;
use crate::job::JobKind;

/// Result type used across the orchestrator surface.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Orchestrator-level error.
///
/// Precondition failures (`NotFound`, `AlreadyRunning`, `MissingPrerequisite`)
/// are returned synchronously from start operations and never enter the
/// `Processing` state. Failures inside a running pipeline are recorded on the
/// job status instead and surface only through status polling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// The key does not identify a known paper.
    #[error("paper not found: {0}")]
    NotFound(PaperId),

    /// A job of this kind is already in flight for the key (single-flight).
    #[error("{kind} already running for {key}")]
    AlreadyRunning { key: PaperId, kind: JobKind },

    /// A required artifact is absent (e.g. correction before analysis).
    #[error("missing prerequisite: {0}")]
    MissingPrerequisite(String),

    /// The external analysis/correction backend reported or raised an error.
    #[error("external operation failed: {0}")]
    ExternalOperation(String),

    /// A backup, artifact write, or store operation failed.
    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A key failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl PipelineError {
    pub fn already_running(key: PaperId, kind: JobKind) -> Self {
        Self::AlreadyRunning { key, kind }
    }

    pub fn missing_prerequisite(msg: impl Into<String>) -> Self {
        Self::MissingPrerequisite(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalOperation(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn invalid_key(msg: impl Into<String>) -> Self {
        Self::InvalidKey(msg.into())
    }
}

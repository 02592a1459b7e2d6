//! Job lifecycle model: kinds, states, and the persisted status record.

use core::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::PaperId;

/// The two pipeline types tracked per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Primary deep-analysis pipeline producing the canonical artifact.
    Analysis,
    /// Follow-up formula-correction pipeline mutating the artifact in place.
    Correction,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Analysis => f.write_str("analysis"),
            JobKind::Correction => f.write_str("correction"),
        }
    }
}

/// Job execution state.
///
/// `NotStarted` is synthesized (absence of a status record while no job is
/// live) and never persisted. Terminal states are `Completed`, `Failed`, and
/// `Cancelled`; starting a new run for the same key transitions from a
/// terminal state (or absence) back to `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotStarted,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::NotStarted => "not_started",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Persisted status record for one (key, kind) slot.
///
/// Created on the first start, mutated only by the pipeline runner and the
/// cancel path, never deleted. The latest state is authoritative; run history
/// is not retained here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub key: PaperId,
    pub kind: JobKind,
    pub state: JobState,
    pub updated_at: DateTime<Utc>,
    /// Human-readable failure message, present only when `state` is `Failed`.
    pub error: Option<String>,
}

impl JobStatus {
    pub fn new(key: PaperId, kind: JobKind, state: JobState) -> Self {
        Self {
            key,
            kind,
            state,
            updated_at: Utc::now(),
            error: None,
        }
    }

    pub fn failed(key: PaperId, kind: JobKind, error: impl Into<String>) -> Self {
        Self {
            key,
            kind,
            state: JobState::Failed,
            updated_at: Utc::now(),
            error: Some(error.into()),
        }
    }

    /// Synthesized record for a key that has never been started.
    pub fn not_started(key: PaperId, kind: JobKind) -> Self {
        Self::new(key, kind, JobState::NotStarted)
    }
}

//! Result/status store adapter.
//!
//! The durable side of the orchestrator: rewritten artifacts and the latest
//! job status per (key, kind). Implementations must provide read-after-write
//! visibility — a status read issued after `set_status` returns must observe
//! that write or a newer one.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use paperflow_core::{JobKind, JobState, JobStatus, PaperId};

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(String),
}

/// Persistence boundary for results and statuses.
///
/// Statuses are never deleted; the latest record per (key, kind) is
/// authoritative. Only persisted states are written here — `NotStarted` is
/// synthesized by the facade from absence.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist the rewritten artifact text for `key` (overwrites).
    async fn save_result(&self, key: &PaperId, text: &str) -> Result<(), StoreError>;

    /// Latest persisted artifact text, if any.
    async fn result(&self, key: &PaperId) -> Result<Option<String>, StoreError>;

    /// Overwrite the status record for (key, kind).
    async fn set_status(
        &self,
        key: &PaperId,
        kind: JobKind,
        state: JobState,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Latest status record for (key, kind), if one was ever written.
    async fn status(&self, key: &PaperId, kind: JobKind) -> Result<Option<JobStatus>, StoreError>;
}

/// In-memory store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    results: RwLock<HashMap<PaperId, String>>,
    statuses: RwLock<HashMap<(PaperId, JobKind), JobStatus>>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn save_result(&self, key: &PaperId, text: &str) -> Result<(), StoreError> {
        self.results
            .write()
            .unwrap()
            .insert(key.clone(), text.to_string());
        Ok(())
    }

    async fn result(&self, key: &PaperId) -> Result<Option<String>, StoreError> {
        Ok(self.results.read().unwrap().get(key).cloned())
    }

    async fn set_status(
        &self,
        key: &PaperId,
        kind: JobKind,
        state: JobState,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        debug_assert!(state != JobState::NotStarted, "NotStarted is never persisted");
        let status = JobStatus {
            key: key.clone(),
            kind,
            state,
            updated_at: Utc::now(),
            error,
        };
        self.statuses
            .write()
            .unwrap()
            .insert((key.clone(), kind), status);
        Ok(())
    }

    async fn status(&self, key: &PaperId, kind: JobKind) -> Result<Option<JobStatus>, StoreError> {
        Ok(self
            .statuses
            .read()
            .unwrap()
            .get(&(key.clone(), kind))
            .cloned())
    }
}

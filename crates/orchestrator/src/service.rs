//! Orchestrator facade.
//!
//! The entire external surface of the pipeline core: start, status, result,
//! cancel, active. Transport-agnostic; suitable behind an HTTP handler or an
//! in-process call. Precondition failures return synchronously and never
//! enter `Processing`; everything after a successful start surfaces only via
//! status polling.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::info;

use paperflow_agents::DocumentLookup;
use paperflow_core::{
    ConfigOverrides, ConfigSource, JobKind, JobState, JobStatus, PaperId, PipelineError,
    PipelineResult,
};

use crate::registry::{JobHandle, JobRegistry};
use crate::runner::PipelineRunner;
use crate::store::{ResultStore, StoreError};

/// Acknowledgement that a pipeline run was accepted and spawned.
#[derive(Debug, Clone)]
pub struct StartReceipt {
    pub key: PaperId,
    pub kind: JobKind,
    pub run_id: u64,
    pub accepted_at: DateTime<Utc>,
}

/// Facade over registry, runner, store, and lookup.
///
/// Concurrent calls for distinct keys never interfere; the only shared lock
/// is the registry's slot map.
pub struct AnalysisService {
    registry: Arc<JobRegistry>,
    store: Arc<dyn ResultStore>,
    lookup: Arc<dyn DocumentLookup>,
    runner: Arc<PipelineRunner>,
    config: Arc<dyn ConfigSource>,
}

impl AnalysisService {
    pub fn new(
        registry: Arc<JobRegistry>,
        store: Arc<dyn ResultStore>,
        lookup: Arc<dyn DocumentLookup>,
        runner: Arc<PipelineRunner>,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            registry,
            store,
            lookup,
            runner,
            config,
        }
    }

    /// Start the analysis pipeline for `key`.
    ///
    /// Synchronous failures: `NotFound` (unknown key), `AlreadyRunning` (live
    /// analysis for the same key), `Persistence` (status write failed; the
    /// slot is released again).
    pub async fn start_analysis(
        &self,
        key: &PaperId,
        overrides: &ConfigOverrides,
    ) -> PipelineResult<StartReceipt> {
        let metadata = self
            .lookup
            .describe(key)
            .await
            .map_err(|e| PipelineError::external(e.to_string()))?
            .ok_or_else(|| PipelineError::NotFound(key.clone()))?;

        let handle = self.registry.try_acquire(key, JobKind::Analysis)?;

        if let Err(err) = self
            .store
            .set_status(key, JobKind::Analysis, JobState::Processing, None)
            .await
        {
            self.registry
                .release(key, JobKind::Analysis, handle.run_id());
            return Err(store_error(err));
        }

        // A cancel may have landed while the Processing write was in flight,
        // in which case the write above clobbered the Cancelled record for a
        // run the registry has already forgotten. Restore the terminal state
        // and skip the spawn; the run is over before it began.
        if handle.cancel_requested() {
            self.store
                .set_status(key, JobKind::Analysis, JobState::Cancelled, None)
                .await
                .map_err(store_error)?;
            info!(key = %key, run_id = handle.run_id(), "run cancelled during start");
            return Ok(receipt(&handle));
        }

        let config = self.config.load_defaults().merged(overrides);
        let task = tokio::spawn(Arc::clone(&self.runner).run_analysis(
            handle.clone(),
            metadata,
            config,
        ));
        Ok(self.accept(handle, task))
    }

    /// Start the correction pipeline for `key`.
    ///
    /// Requires the analysis artifact and the OCR reference on disk, and no
    /// live analysis run for the same key (the prerequisite artifact would
    /// not be stable under it).
    pub async fn start_correction(
        &self,
        key: &PaperId,
        overrides: &ConfigOverrides,
    ) -> PipelineResult<StartReceipt> {
        if self
            .lookup
            .describe(key)
            .await
            .map_err(|e| PipelineError::external(e.to_string()))?
            .is_none()
        {
            return Err(PipelineError::NotFound(key.clone()));
        }

        let vault = self.runner.vault();
        if !vault.has_analysis(key) {
            return Err(PipelineError::missing_prerequisite(format!(
                "analysis artifact not found: {}",
                vault.analysis_path(key).display()
            )));
        }
        if !vault.has_ocr(key) {
            return Err(PipelineError::missing_prerequisite(format!(
                "OCR reference not found: {}",
                vault.ocr_path(key).display()
            )));
        }
        // Atomic with the cross-kind check: a concurrent start_analysis
        // cannot slip in between "no live analysis" and the correction claim.
        let handle = self.registry.try_acquire_correction(key)?;
        let config = self.config.load_defaults().merged(overrides);
        let task = tokio::spawn(Arc::clone(&self.runner).run_correction(handle.clone(), config));
        Ok(self.accept(handle, task))
    }

    /// Current status for (key, kind).
    ///
    /// A live registry slot is reported as `Processing` regardless of what
    /// the store holds; absence of both is synthesized as `NotStarted`.
    pub async fn status(&self, key: &PaperId, kind: JobKind) -> PipelineResult<JobStatus> {
        if self.registry.is_active(key, kind) {
            return Ok(JobStatus::new(key.clone(), kind, JobState::Processing));
        }
        match self.store.status(key, kind).await.map_err(store_error)? {
            Some(status) => Ok(status),
            None => Ok(JobStatus::not_started(key.clone(), kind)),
        }
    }

    /// Latest persisted artifact text for `key`, if any run ever completed.
    pub async fn result(&self, key: &PaperId) -> PipelineResult<Option<String>> {
        self.store.result(key).await.map_err(store_error)
    }

    /// Cancel the live (key, kind) run.
    ///
    /// Cooperative: the registry forgets the run immediately and `Cancelled`
    /// is written here; the detached task keeps running but its final status
    /// write is suppressed by the run-id guard. `NotFound` if nothing is
    /// live.
    pub async fn cancel(&self, key: &PaperId, kind: JobKind) -> PipelineResult<()> {
        let Some(orphan) = self.registry.request_cancel(key, kind) else {
            return Err(PipelineError::NotFound(key.clone()));
        };
        info!(key = %key, kind = %kind, run_id = orphan.run_id(), "cancelled live run");
        self.store
            .set_status(key, kind, JobState::Cancelled, None)
            .await
            .map_err(store_error)
    }

    /// Keys with a live run of `kind`, sorted.
    pub fn active(&self, kind: JobKind) -> Vec<PaperId> {
        self.registry.active_keys(kind)
    }

    fn accept(&self, handle: JobHandle, task: JoinHandle<()>) -> StartReceipt {
        self.registry.attach(&handle, task);
        info!(
            key = %handle.key(),
            kind = %handle.kind(),
            run_id = handle.run_id(),
            "pipeline run accepted"
        );
        receipt(&handle)
    }
}

fn receipt(handle: &JobHandle) -> StartReceipt {
    StartReceipt {
        key: handle.key().clone(),
        kind: handle.kind(),
        run_id: handle.run_id(),
        accepted_at: handle.started_at(),
    }
}

fn store_error(err: StoreError) -> PipelineError {
    PipelineError::persistence(err.to_string())
}

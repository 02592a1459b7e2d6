//! Pipeline task bodies.
//!
//! One async task per pipeline run. Each body follows the same discipline:
//! hold a `ReleaseGuard` for the whole run so the registry slot is freed on
//! every exit path, wrap the agent call in the configured deadline, and route
//! every status write through the run-id guard so a superseded (cancelled)
//! run can never clobber a newer run's status.

use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use paperflow_agents::{AnalysisAgent, CorrectionAgent, PaperMetadata};
use paperflow_core::{JobState, PaperId, PipelineConfig};

use crate::registry::{JobHandle, JobRegistry, ReleaseGuard};
use crate::rewrite::{self, RewriteOutcome};
use crate::store::ResultStore;
use crate::vault::PaperVault;

/// Executes pipeline runs against the injected collaborators.
pub struct PipelineRunner {
    registry: Arc<JobRegistry>,
    store: Arc<dyn ResultStore>,
    vault: PaperVault,
    analysis: Arc<dyn AnalysisAgent>,
    correction: Arc<dyn CorrectionAgent>,
}

impl PipelineRunner {
    pub fn new(
        registry: Arc<JobRegistry>,
        store: Arc<dyn ResultStore>,
        vault: PaperVault,
        analysis: Arc<dyn AnalysisAgent>,
        correction: Arc<dyn CorrectionAgent>,
    ) -> Self {
        Self {
            registry,
            store,
            vault,
            analysis,
            correction,
        }
    }

    pub fn vault(&self) -> &PaperVault {
        &self.vault
    }

    /// Analysis task body. The facade has already written `Processing` and
    /// verified the key exists; `metadata` is the lookup result.
    pub async fn run_analysis(
        self: Arc<Self>,
        handle: JobHandle,
        metadata: PaperMetadata,
        config: PipelineConfig,
    ) {
        let _guard = ReleaseGuard::new(Arc::clone(&self.registry), handle.clone());
        let key = handle.key().clone();
        info!(key = %key, run_id = handle.run_id(), model = %config.analysis_model, "analysis run started");

        let report = match timeout(
            config.timeout,
            self.analysis.run(&key, &metadata, &config),
        )
        .await
        {
            Err(_) => {
                self.finish(
                    &handle,
                    JobState::Failed,
                    Some(format!(
                        "analysis timed out after {}s",
                        config.timeout.as_secs()
                    )),
                )
                .await;
                return;
            }
            Ok(Err(err)) => {
                self.finish(&handle, JobState::Failed, Some(err.to_string()))
                    .await;
                return;
            }
            Ok(Ok(report)) => report,
        };

        if handle.cancel_requested() {
            info!(key = %key, run_id = handle.run_id(), "analysis run cancelled, discarding result");
            return;
        }

        let rewritten = self.rewrite_for(&key, &report.markdown);
        if let Err(err) = self.vault.write_analysis(&key, &rewritten.text) {
            self.finish(&handle, JobState::Failed, Some(err.to_string()))
                .await;
            return;
        }
        if let Err(err) = self.store.save_result(&key, &rewritten.text).await {
            self.finish(&handle, JobState::Failed, Some(err.to_string()))
                .await;
            return;
        }

        info!(
            key = %key,
            run_id = handle.run_id(),
            references = rewritten.references_rewritten,
            "analysis run completed"
        );
        self.finish(&handle, JobState::Completed, None).await;
    }

    /// Correction task body. Preconditions (artifact and OCR file present, no
    /// live analysis) were checked synchronously by the facade.
    ///
    /// Backup comes first: if the snapshot cannot be taken, the run fails
    /// before anything is mutated.
    pub async fn run_correction(self: Arc<Self>, handle: JobHandle, config: PipelineConfig) {
        let _guard = ReleaseGuard::new(Arc::clone(&self.registry), handle.clone());
        let key = handle.key().clone();
        info!(key = %key, run_id = handle.run_id(), model = %config.correction_model, "correction run started");

        let backup = match self.vault.backup_analysis(&key) {
            Ok(path) => path,
            Err(err) => {
                self.finish(&handle, JobState::Failed, Some(err.to_string()))
                    .await;
                return;
            }
        };
        self.write_status(&handle, JobState::Processing, None).await;

        let analysis_path = self.vault.analysis_path(&key);
        let ocr_path = self.vault.ocr_path(&key);
        let report = match timeout(
            config.timeout,
            self.correction.run(&analysis_path, &ocr_path, &config),
        )
        .await
        {
            Err(_) => {
                self.finish(
                    &handle,
                    JobState::Failed,
                    Some(format!(
                        "correction timed out after {}s",
                        config.timeout.as_secs()
                    )),
                )
                .await;
                return;
            }
            Ok(Err(err)) => {
                self.finish(&handle, JobState::Failed, Some(err.to_string()))
                    .await;
                return;
            }
            Ok(Ok(report)) => report,
        };

        if handle.cancel_requested() {
            info!(key = %key, run_id = handle.run_id(), "correction run cancelled, discarding result");
            return;
        }

        match report.corrected_markdown {
            None => {
                info!(key = %key, run_id = handle.run_id(), corrections = 0, "no corrections needed, artifact untouched");
            }
            Some(markdown) => {
                let rewritten = self.rewrite_for(&key, &markdown);
                if let Err(err) = self.vault.write_analysis(&key, &rewritten.text) {
                    self.finish(&handle, JobState::Failed, Some(err.to_string()))
                        .await;
                    return;
                }
                if let Err(err) = self.store.save_result(&key, &rewritten.text).await {
                    self.finish(&handle, JobState::Failed, Some(err.to_string()))
                        .await;
                    return;
                }
                info!(
                    key = %key,
                    run_id = handle.run_id(),
                    corrections = report.corrections.len(),
                    backup = %backup.display(),
                    "corrections applied"
                );
            }
        }

        self.finish(&handle, JobState::Completed, None).await;
    }

    fn rewrite_for(&self, key: &PaperId, markdown: &str) -> RewriteOutcome {
        let outcome = rewrite::rewrite(markdown, key);
        if let Some(warning) = &outcome.warning {
            warn!(key = %key, "{warning}");
        }
        let missing = rewrite::missing_assets(markdown, &self.vault.assets_dir(key));
        if !missing.is_empty() {
            warn!(key = %key, missing = ?missing, "referenced assets not found on disk");
        }
        outcome
    }

    /// Terminal status write plus log line; suppressed for superseded runs.
    async fn finish(&self, handle: &JobHandle, state: JobState, error: Option<String>) {
        if let Some(message) = &error {
            warn!(
                key = %handle.key(),
                kind = %handle.kind(),
                run_id = handle.run_id(),
                error = %message,
                "pipeline run failed"
            );
        }
        self.write_status(handle, state, error).await;
    }

    async fn write_status(&self, handle: &JobHandle, state: JobState, error: Option<String>) {
        if handle.cancel_requested()
            || !self
                .registry
                .is_current(handle.key(), handle.kind(), handle.run_id())
        {
            debug!(
                key = %handle.key(),
                kind = %handle.kind(),
                run_id = handle.run_id(),
                "suppressed status write for superseded run"
            );
            return;
        }
        if let Err(err) = self
            .store
            .set_status(handle.key(), handle.kind(), state, error)
            .await
        {
            error!(
                key = %handle.key(),
                kind = %handle.kind(),
                error = %err,
                "failed to persist job status"
            );
        }
    }
}

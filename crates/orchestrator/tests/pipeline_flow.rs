//! End-to-end pipeline scenarios through the facade.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::time::sleep;

use paperflow_agents::{
    AgentError, AnalysisAgent, AnalysisReport, CorrectionAgent, CorrectionRecord,
    CorrectionReport, InMemoryDocumentLookup, PaperMetadata,
};
use paperflow_core::{
    ConfigOverrides, JobKind, JobState, PaperId, PipelineConfig, PipelineError, StaticConfigSource,
};
use paperflow_orchestrator::{
    AnalysisService, InMemoryResultStore, JobRegistry, PaperVault, PipelineRunner,
};

/// Analysis agent that blocks until a gate permit is added, then returns its
/// script. Permits accumulate, so releasing before the agent starts waiting
/// is not a lost wakeup.
struct GatedAnalysis {
    gate: Arc<Semaphore>,
    result: Result<AnalysisReport, AgentError>,
}

#[async_trait]
impl AnalysisAgent for GatedAnalysis {
    async fn run(
        &self,
        _key: &PaperId,
        _metadata: &PaperMetadata,
        _config: &PipelineConfig,
    ) -> Result<AnalysisReport, AgentError> {
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.result.clone()
    }
}

struct ScriptedCorrection {
    result: Result<CorrectionReport, AgentError>,
}

#[async_trait]
impl CorrectionAgent for ScriptedCorrection {
    async fn run(
        &self,
        _analysis_path: &Path,
        _ocr_path: &Path,
        _config: &PipelineConfig,
    ) -> Result<CorrectionReport, AgentError> {
        self.result.clone()
    }
}

struct Harness {
    service: AnalysisService,
    lookup: Arc<InMemoryDocumentLookup>,
    vault: PaperVault,
}

fn harness(
    root: &Path,
    analysis: impl AnalysisAgent + 'static,
    correction: impl CorrectionAgent + 'static,
) -> Harness {
    paperflow_observability::init();
    let registry = Arc::new(JobRegistry::new());
    let store = Arc::new(InMemoryResultStore::new());
    let lookup = Arc::new(InMemoryDocumentLookup::new());
    let vault = PaperVault::new(root);
    let runner = Arc::new(PipelineRunner::new(
        Arc::clone(&registry),
        store.clone(),
        vault.clone(),
        Arc::new(analysis),
        Arc::new(correction),
    ));
    let service = AnalysisService::new(
        registry,
        store,
        lookup.clone(),
        runner,
        Arc::new(StaticConfigSource::default()),
    );
    Harness {
        service,
        lookup,
        vault,
    }
}

fn known_key(h: &Harness, raw: &str) -> PaperId {
    let key = PaperId::new(raw).unwrap();
    h.lookup.insert(
        key.clone(),
        PaperMetadata {
            title: format!("Paper {raw}"),
            source_url: format!("https://arxiv.org/abs/{raw}"),
        },
    );
    key
}

async fn wait_terminal(h: &Harness, key: &PaperId, kind: JobKind) -> Result<JobState> {
    for _ in 0..500 {
        let status = h.service.status(key, kind).await?;
        if status.state.is_terminal() {
            return Ok(status.state);
        }
        sleep(Duration::from_millis(10)).await;
    }
    anyhow::bail!("job never reached a terminal state");
}

fn unchanged_correction() -> ScriptedCorrection {
    ScriptedCorrection {
        result: Ok(CorrectionReport::unchanged()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_start_admits_exactly_one() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Semaphore::new(0));
    let h = Arc::new(harness(
        dir.path(),
        GatedAnalysis {
            gate: Arc::clone(&gate),
            result: Ok(AnalysisReport::new("report")),
        },
        unchanged_correction(),
    ));
    let key = known_key(&h, "2501.00001");

    let mut joins = Vec::new();
    for _ in 0..50 {
        let h = Arc::clone(&h);
        let key = key.clone();
        joins.push(tokio::spawn(async move {
            h.service
                .start_analysis(&key, &ConfigOverrides::default())
                .await
                .is_ok()
        }));
    }

    let mut accepted = 0;
    for join in joins {
        if join.await? {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(h.service.active(JobKind::Analysis), vec![key.clone()]);

    gate.add_permits(1);
    assert_eq!(wait_terminal(&h, &key, JobKind::Analysis).await?, JobState::Completed);
    assert!(h.service.active(JobKind::Analysis).is_empty());
    Ok(())
}

#[tokio::test]
async fn analysis_end_to_end_persists_rewritten_artifact() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        dir.path(),
        GatedAnalysis {
            gate: Arc::clone(&gate),
            result: Ok(AnalysisReport::new(
                "# Summary\n![Fig 1](imgs/fig1.png)\n![Fig 1](imgs/fig1.png)\n",
            )),
        },
        unchanged_correction(),
    );
    let key = known_key(&h, "2501.00001");

    let receipt = h
        .service
        .start_analysis(&key, &ConfigOverrides::default())
        .await?;
    assert_eq!(receipt.kind, JobKind::Analysis);

    // Live run reported as Processing.
    let status = h.service.status(&key, JobKind::Analysis).await?;
    assert_eq!(status.state, JobState::Processing);

    gate.add_permits(1);
    assert_eq!(wait_terminal(&h, &key, JobKind::Analysis).await?, JobState::Completed);

    let expected = "# Summary\n![Fig 1](/papers/2501.00001/assets/fig1.png)\n![Fig 1](/papers/2501.00001/assets/fig1.png)\n";
    assert_eq!(h.service.result(&key).await?.as_deref(), Some(expected));
    assert_eq!(
        std::fs::read_to_string(h.vault.analysis_path(&key))?,
        expected
    );
    Ok(())
}

#[tokio::test]
async fn correction_without_changes_keeps_artifact_byte_identical() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        dir.path(),
        GatedAnalysis {
            gate,
            result: Ok(AnalysisReport::new("unused")),
        },
        unchanged_correction(),
    );
    let key = known_key(&h, "2501.00002");

    let original = "# Analysis\n$E = mc^2$\n";
    h.vault.write_analysis(&key, original)?;
    std::fs::write(h.vault.ocr_path(&key), "ocr text")?;

    h.service
        .start_correction(&key, &ConfigOverrides::default())
        .await?;
    assert_eq!(
        wait_terminal(&h, &key, JobKind::Correction).await?,
        JobState::Completed
    );

    assert_eq!(std::fs::read_to_string(h.vault.analysis_path(&key))?, original);
    let backups = h.vault.backups(&key);
    assert_eq!(backups.len(), 1);
    assert_eq!(std::fs::read_to_string(&backups[0])?, original);
    Ok(())
}

#[tokio::test]
async fn correction_applies_changes_after_backup() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        dir.path(),
        GatedAnalysis {
            gate,
            result: Ok(AnalysisReport::new("unused")),
        },
        ScriptedCorrection {
            result: Ok(CorrectionReport {
                corrected_markdown: Some("# Analysis\n$E = mc^{2}$\n".to_string()),
                corrections: vec![CorrectionRecord {
                    operation: "replace_lines".to_string(),
                    affected_lines: "2-2".to_string(),
                    message: "normalized exponent braces".to_string(),
                }],
            }),
        },
    );
    let key = known_key(&h, "2501.00002");

    let original = "# Analysis\n$E = mc^2$\n";
    h.vault.write_analysis(&key, original)?;
    std::fs::write(h.vault.ocr_path(&key), "ocr text")?;

    h.service
        .start_correction(&key, &ConfigOverrides::default())
        .await?;
    assert_eq!(
        wait_terminal(&h, &key, JobKind::Correction).await?,
        JobState::Completed
    );

    assert_eq!(
        std::fs::read_to_string(h.vault.analysis_path(&key))?,
        "# Analysis\n$E = mc^{2}$\n"
    );
    // The pre-run snapshot survives the overwrite.
    let backups = h.vault.backups(&key);
    assert_eq!(backups.len(), 1);
    assert_eq!(std::fs::read_to_string(&backups[0])?, original);
    assert_eq!(
        h.service.result(&key).await?.as_deref(),
        Some("# Analysis\n$E = mc^{2}$\n")
    );
    Ok(())
}

#[tokio::test]
async fn failed_run_allows_restart() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        dir.path(),
        GatedAnalysis {
            gate: Arc::clone(&gate),
            result: Err(AgentError::backend("model backend rejected the request")),
        },
        unchanged_correction(),
    );
    let key = known_key(&h, "2501.00003");

    h.service
        .start_analysis(&key, &ConfigOverrides::default())
        .await?;
    gate.add_permits(1);
    assert_eq!(wait_terminal(&h, &key, JobKind::Analysis).await?, JobState::Failed);

    let status = h.service.status(&key, JobKind::Analysis).await?;
    assert!(status.error.as_deref().unwrap().contains("rejected"));
    assert!(h.service.result(&key).await?.is_none());

    // The slot was released, so a retry is accepted.
    let receipt = h
        .service
        .start_analysis(&key, &ConfigOverrides::default())
        .await?;
    assert!(receipt.run_id > 1);
    Ok(())
}

#[tokio::test]
async fn cancel_forgets_run_and_suppresses_its_final_write() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        dir.path(),
        GatedAnalysis {
            gate: Arc::clone(&gate),
            result: Ok(AnalysisReport::new("stale result")),
        },
        unchanged_correction(),
    );
    let key = known_key(&h, "2501.00004");

    h.service
        .start_analysis(&key, &ConfigOverrides::default())
        .await?;
    h.service.cancel(&key, JobKind::Analysis).await?;

    // Cancelled is visible immediately and the slot is free.
    let status = h.service.status(&key, JobKind::Analysis).await?;
    assert_eq!(status.state, JobState::Cancelled);
    assert!(h.service.active(JobKind::Analysis).is_empty());

    // Let the orphaned task finish; its terminal write must be suppressed.
    gate.add_permits(1);
    sleep(Duration::from_millis(50)).await;
    let status = h.service.status(&key, JobKind::Analysis).await?;
    assert_eq!(status.state, JobState::Cancelled);
    assert!(h.service.result(&key).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn second_start_while_live_is_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let gate = Arc::new(Semaphore::new(0));
    let h = harness(
        dir.path(),
        GatedAnalysis {
            gate: Arc::clone(&gate),
            result: Ok(AnalysisReport::new("report")),
        },
        unchanged_correction(),
    );
    let key = known_key(&h, "2501.00005");

    h.service
        .start_analysis(&key, &ConfigOverrides::default())
        .await?;
    let err = h
        .service
        .start_analysis(&key, &ConfigOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::AlreadyRunning { .. }));

    // A live analysis also blocks correction for the same key.
    h.vault.write_analysis(&key, "artifact")?;
    std::fs::write(h.vault.ocr_path(&key), "ocr")?;
    let err = h
        .service
        .start_correction(&key, &ConfigOverrides::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::AlreadyRunning {
            kind: JobKind::Analysis,
            ..
        }
    ));

    // Distinct keys are unaffected.
    let other = known_key(&h, "2501.00006");
    assert!(
        h.service
            .start_analysis(&other, &ConfigOverrides::default())
            .await
            .is_ok()
    );

    // One permit per started run.
    gate.add_permits(2);
    wait_terminal(&h, &key, JobKind::Analysis).await?;
    wait_terminal(&h, &other, JobKind::Analysis).await?;
    Ok(())
}

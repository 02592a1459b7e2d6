//! Deep-analysis agent boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use paperflow_core::{PaperId, PipelineConfig};

use crate::error::AgentError;
use crate::lookup::PaperMetadata;

/// Output of one analysis run: the raw Markdown report.
///
/// Image references in the report are still relative (`imgs/...`); the
/// orchestrator rewrites them before the artifact is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub markdown: String,
}

impl AnalysisReport {
    pub fn new(markdown: impl Into<String>) -> Self {
        Self {
            markdown: markdown.into(),
        }
    }
}

/// The opaque long-running analysis operation.
///
/// One call per pipeline run; may block for minutes on the LLM backend. The
/// orchestrator wraps the call in the configured deadline and does not mutate
/// any state until it returns.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    async fn run(
        &self,
        key: &PaperId,
        metadata: &PaperMetadata,
        config: &PipelineConfig,
    ) -> Result<AnalysisReport, AgentError>;
}

//! Formula-correction agent boundary.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use paperflow_core::PipelineConfig;

use crate::error::AgentError;

/// One applied correction, kept for the observability summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionRecord {
    /// Edit operation performed (e.g. `replace_lines`).
    pub operation: String,
    /// Line range the edit touched, as reported by the backend.
    pub affected_lines: String,
    pub message: String,
}

/// Output of one correction run.
///
/// `corrected_markdown` is `None` when the backend found nothing to fix; the
/// artifact must then be left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub corrected_markdown: Option<String>,
    pub corrections: Vec<CorrectionRecord>,
}

impl CorrectionReport {
    /// Report for a run where no corrections were needed.
    pub fn unchanged() -> Self {
        Self {
            corrected_markdown: None,
            corrections: Vec::new(),
        }
    }
}

/// The opaque long-running correction operation.
///
/// Reads the analysis artifact and the OCR reference from disk; both paths
/// are guaranteed to exist when the orchestrator makes the call.
#[async_trait]
pub trait CorrectionAgent: Send + Sync {
    async fn run(
        &self,
        analysis_path: &Path,
        ocr_path: &Path,
        config: &PipelineConfig,
    ) -> Result<CorrectionReport, AgentError>;
}

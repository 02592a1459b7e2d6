//! Document lookup: existence checks and descriptive metadata.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use paperflow_core::PaperId;

use crate::error::AgentError;

/// Descriptive metadata for a paper, fed to the analysis agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: String,
    /// Source locator (e.g. the abstract page URL).
    pub source_url: String,
}

/// Read-side lookup of known papers.
///
/// `describe` returning `None` is the `NotFound` precondition for every start
/// operation; it is checked synchronously before a registry slot is acquired.
#[async_trait]
pub trait DocumentLookup: Send + Sync {
    async fn exists(&self, key: &PaperId) -> Result<bool, AgentError> {
        Ok(self.describe(key).await?.is_some())
    }

    async fn describe(&self, key: &PaperId) -> Result<Option<PaperMetadata>, AgentError>;
}

/// In-memory lookup for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDocumentLookup {
    papers: RwLock<HashMap<PaperId, PaperMetadata>>,
}

impl InMemoryDocumentLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: PaperId, metadata: PaperMetadata) {
        self.papers.write().unwrap().insert(key, metadata);
    }
}

#[async_trait]
impl DocumentLookup for InMemoryDocumentLookup {
    async fn describe(&self, key: &PaperId) -> Result<Option<PaperMetadata>, AgentError> {
        Ok(self.papers.read().unwrap().get(key).cloned())
    }
}

//! `paperflow-agents` — external collaborator boundary.
//!
//! Traits for the long-running LLM/OCR-backed operations and the document
//! lookup the orchestrator depends on. This crate stays transport- and
//! storage-agnostic: implementations (HTTP clients, agent frameworks) live
//! with the embedding application; the orchestrator only sees these traits.

pub mod analysis;
pub mod correction;
pub mod error;
pub mod lookup;

pub use analysis::{AnalysisAgent, AnalysisReport};
pub use correction::{CorrectionAgent, CorrectionRecord, CorrectionReport};
pub use error::AgentError;
pub use lookup::{DocumentLookup, InMemoryDocumentLookup, PaperMetadata};

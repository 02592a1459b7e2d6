//! Background job orchestration for per-paper analysis pipelines.
//!
//! Long-running, cancellable, per-document pipeline runs with single-flight
//! admission per (key, kind), cooperative cancellation, and durable
//! status/artifact persistence. [`AnalysisService`] is the external surface;
//! everything else is the machinery behind it.

pub mod registry;
pub mod rewrite;
pub mod runner;
pub mod service;
pub mod store;
pub mod vault;

pub use registry::{JobHandle, JobRegistry, ReleaseGuard};
pub use rewrite::{RewriteOutcome, RewriteWarning, missing_assets, rewrite};
pub use runner::PipelineRunner;
pub use service::{AnalysisService, StartReceipt};
pub use store::{InMemoryResultStore, ResultStore, StoreError};
pub use vault::PaperVault;

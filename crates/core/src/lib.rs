//! `paperflow-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! paper identifiers, the job lifecycle model, the error taxonomy, and typed
//! pipeline configuration.

pub mod config;
pub mod error;
pub mod id;
pub mod job;

pub use config::{ConfigOverrides, ConfigSource, PipelineConfig, StaticConfigSource};
pub use error::{PipelineError, PipelineResult};
pub use id::PaperId;
pub use job::{JobKind, JobState, JobStatus};

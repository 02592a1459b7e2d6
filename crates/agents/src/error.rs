use thiserror::Error;

/// Failure reported by an external agent call.
///
/// These are long-running network-bound operations; any of them may fail,
/// time out, or return malformed output. The orchestrator maps every variant
/// to a `Failed` job status and never retries automatically.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// The backend executed but reported an error.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend produced no usable output.
    #[error("empty result: {0}")]
    EmptyResult(String),

    /// The call could not be made (connectivity, auth, missing model).
    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl AgentError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn empty(msg: impl Into<String>) -> Self {
        Self::EmptyResult(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}

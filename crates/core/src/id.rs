//! Strongly-typed identifiers used across the domain.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Identifier of a paper (the unit of pipeline work).
///
/// Keys are assigned externally (arXiv-style, e.g. `"2501.00001"`) and treated
/// as opaque. All operations for the same real-world paper must resolve to the
/// same key. The key also names the paper's directory in the artifact vault,
/// so path separators and relative-path components are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaperId(String);

impl PaperId {
    /// Validate and wrap a raw key.
    pub fn new(raw: impl Into<String>) -> Result<Self, PipelineError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(PipelineError::invalid_key("key must not be empty"));
        }
        if raw.contains('/') || raw.contains('\\') || raw == "." || raw == ".." {
            return Err(PipelineError::invalid_key(format!(
                "key must not contain path components: {raw:?}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for PaperId {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PaperId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

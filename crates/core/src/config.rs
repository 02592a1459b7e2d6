//! Typed pipeline configuration with an explicit override-merge rule.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration applied to a single pipeline run.
///
/// Model names are opaque `provider.model` strings routed by the agent
/// implementations; this crate does not interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model driving the text-analysis stage.
    pub analysis_model: String,
    /// Model used for figure/vision passes during analysis.
    pub vision_model: String,
    /// Model used by the formula-correction pipeline.
    pub correction_model: String,
    /// Deadline for a single external agent call; expiry maps to `Failed`.
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_model: "deepseek.DeepSeek_V3".to_string(),
            vision_model: "ollama.Qwen2_5_VL_7B".to_string(),
            correction_model: "ollama.Qwen3_30B".to_string(),
            timeout: Duration::from_secs(600),
        }
    }
}

impl PipelineConfig {
    /// Shallow merge: a field present in `overrides` wins, an absent field
    /// retains the value from `self`.
    pub fn merged(&self, overrides: &ConfigOverrides) -> Self {
        Self {
            analysis_model: overrides
                .analysis_model
                .clone()
                .unwrap_or_else(|| self.analysis_model.clone()),
            vision_model: overrides
                .vision_model
                .clone()
                .unwrap_or_else(|| self.vision_model.clone()),
            correction_model: overrides
                .correction_model
                .clone()
                .unwrap_or_else(|| self.correction_model.clone()),
            timeout: overrides.timeout.unwrap_or(self.timeout),
        }
    }
}

/// Per-call configuration overrides supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    pub analysis_model: Option<String>,
    pub vision_model: Option<String>,
    pub correction_model: Option<String>,
    pub timeout: Option<Duration>,
}

impl ConfigOverrides {
    pub fn with_analysis_model(mut self, model: impl Into<String>) -> Self {
        self.analysis_model = Some(model.into());
        self
    }

    pub fn with_vision_model(mut self, model: impl Into<String>) -> Self {
        self.vision_model = Some(model.into());
        self
    }

    pub fn with_correction_model(mut self, model: impl Into<String>) -> Self {
        self.correction_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Source of configuration defaults (settings store, environment, static).
pub trait ConfigSource: Send + Sync {
    fn load_defaults(&self) -> PipelineConfig;
}

/// Fixed in-process defaults for tests and single-node deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource {
    defaults: PipelineConfig,
}

impl StaticConfigSource {
    pub fn new(defaults: PipelineConfig) -> Self {
        Self { defaults }
    }
}

impl ConfigSource for StaticConfigSource {
    fn load_defaults(&self) -> PipelineConfig {
        self.defaults.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_overrides_keep_defaults() {
        let defaults = PipelineConfig::default();
        let merged = defaults.merged(&ConfigOverrides::default());
        assert_eq!(merged, defaults);
    }

    #[test]
    fn present_override_fields_win() {
        let defaults = PipelineConfig::default();
        let overrides = ConfigOverrides::default()
            .with_correction_model("ollama.Qwen3_32B")
            .with_timeout(Duration::from_secs(120));

        let merged = defaults.merged(&overrides);
        assert_eq!(merged.correction_model, "ollama.Qwen3_32B");
        assert_eq!(merged.timeout, Duration::from_secs(120));
        // Absent fields retained.
        assert_eq!(merged.analysis_model, defaults.analysis_model);
        assert_eq!(merged.vision_model, defaults.vision_model);
    }

    #[test]
    fn static_source_returns_its_defaults() {
        let mut cfg = PipelineConfig::default();
        cfg.analysis_model = "deepseek.DeepSeek_R1".to_string();
        let source = StaticConfigSource::new(cfg.clone());
        assert_eq!(source.load_defaults(), cfg);
    }
}

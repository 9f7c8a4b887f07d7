//! The layered `Settings` aggregate (§4.11, §6.3, §9 Design Notes).
//!
//! Assembled once per process from compiled-in defaults, an optional
//! layered file, and environment-variable overrides (prefixed
//! `ALIGN_`), validated eagerly, then threaded as an immutable value
//! through the orchestrator and every stage. This directly supersedes
//! the source's process-singleton settings pattern: there is no
//! `Settings::global()` anywhere in this crate.

use crate::observability::ObservabilityConfig;
use crate::stages::PipelineConfig;
use crate::ConfigError;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_strict(&self) -> bool {
        matches!(self, Self::Production | Self::Staging)
    }
}

/// Idempotency cache behavior (§5): TTL for `(tenant, Idempotency-Key)`
/// dedup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self { enabled: true, ttl_seconds: 300 }
    }
}

/// Bounds on in-session memory retrieval (§4.3); kept distinct from
/// `retrieval` because memory has no selection-strategy knob of its own
/// in §6.3 — only a flat top-k.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub enabled: bool,
    pub top_k: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { enabled: true, top_k: 5 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub idempotency: IdempotencyConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Load defaults, then an optional file at `path`, then environment
    /// variables prefixed `ALIGN_` (double-underscore nested, e.g.
    /// `ALIGN_PIPELINE__RETRIEVAL__TOP_K=15`). Validates before
    /// returning so the server fails fast rather than accepting traffic
    /// against an inconsistent configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder().add_source(
            Config::try_from(&defaults).map_err(|e| ConfigError::ParseError(e.to_string()))?,
        );

        if let Some(path) = path {
            if path.exists() {
                builder = builder.add_source(File::from(path));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ALIGN")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Eager validation: numeric ranges, threshold ordering. Intended to
    /// run once at startup, not per turn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sf = &self.pipeline.scenario_filter;
        if !(0.0..=1.0).contains(&sf.transition_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.scenario_filter.transition_threshold".into(),
                message: "must be in [0.0, 1.0]".into(),
            });
        }
        if sf.sanity_threshold > sf.transition_threshold {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.scenario_filter.sanity_threshold".into(),
                message: "must be <= transition_threshold".into(),
            });
        }
        if sf.exit_intent_threshold < sf.entry_threshold {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.scenario_filter.exit_intent_threshold".into(),
                message: "must be >= entry_threshold (switching scenarios should be harder than entering one)".into(),
            });
        }

        let ef = &self.pipeline.enforcement;
        if ef.relevance_check.enabled && !(0.0..=1.0).contains(&ef.relevance_check.threshold) {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.enforcement.relevance_check.threshold".into(),
                message: "must be in [0.0, 1.0]".into(),
            });
        }

        let gf = &self.pipeline.migration.gap_fill;
        if gf.no_confirm_threshold < gf.use_threshold {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.migration.gap_fill.no_confirm_threshold".into(),
                message: "must be >= use_threshold".into(),
            });
        }

        let rf = &self.pipeline.rule_filter;
        if rf.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.rule_filter.batch_size".into(),
                message: "must be >= 1".into(),
            });
        }

        let te = &self.pipeline.tool_execution;
        if te.max_parallel == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline.tool_execution.max_parallel".into(),
                message: "must be >= 1".into(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn inconsistent_thresholds_are_rejected() {
        let mut settings = Settings::default();
        settings.pipeline.scenario_filter.sanity_threshold = 0.9;
        settings.pipeline.scenario_filter.transition_threshold = 0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn env_override_applies() {
        std::env::set_var("ALIGN_PIPELINE__RETRIEVAL__TOP_K", "42");
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.pipeline.retrieval.top_k, 42);
        std::env::remove_var("ALIGN_PIPELINE__RETRIEVAL__TOP_K");
    }
}

//! Layered configuration for the alignment engine (§4.11, §6.3).
//!
//! `Settings` is the single immutable aggregate assembled at startup
//! from compiled-in defaults, an optional file, and environment
//! overrides, then threaded through the orchestrator and every stage —
//! never read from ambient/global state (§9 Design Notes).

pub mod error;
pub mod observability;
pub mod settings;
pub mod stages;

pub use error::ConfigError;
pub use observability::{LogFormat, MetricsConfig, ObservabilityConfig, TracingConfig};
pub use settings::{IdempotencyConfig, MemoryConfig, RuntimeEnvironment, Settings};
pub use stages::{
    ContextExtractionConfig, ContextExtractionMode, EnforcementConfig, FallbackBehavior,
    GapFillConfig, GenerationConfig, GroundingCheckConfig, MigrationConfig, PipelineConfig,
    RelevanceCheckConfig, RerankingConfig, RetrievalConfig, RuleFilterConfig,
    ScenarioFilterConfig, SelectionStrategyKind, SelectionStrategyParams, ToolExecutionConfig,
};

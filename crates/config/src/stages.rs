//! Per-stage configuration structs (§6.3). Each stage of the Turn
//! Pipeline is handed its own slice of the immutable [`crate::Settings`]
//! aggregate; nothing here is read from ambient/global state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContextExtractionMode {
    #[default]
    Llm,
    EmbeddingOnly,
    Disabled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextExtractionConfig {
    pub mode: ContextExtractionMode,
    pub model: String,
    pub history_turns: u32,
}

impl Default for ContextExtractionConfig {
    fn default() -> Self {
        Self {
            mode: ContextExtractionMode::Llm,
            model: "default".to_string(),
            history_turns: 6,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategyKind {
    #[default]
    FixedK,
    Elbow,
    AdaptiveK,
    Entropy,
    Cluster,
}

/// Numeric knobs for whichever [`SelectionStrategyKind`] is configured;
/// unused fields for the chosen kind are simply ignored rather than
/// requiring a separate struct per variant, matching the corpus's
/// flattened-config convention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SelectionStrategyParams {
    pub k: usize,
    pub drop_threshold: f32,
    pub alpha: f32,
    pub low_k: usize,
    pub high_k: usize,
    pub entropy_threshold: f32,
    pub eps: f32,
    pub min_samples: usize,
    pub top_per_cluster: usize,
}

impl Default for SelectionStrategyParams {
    fn default() -> Self {
        Self {
            k: 5,
            drop_threshold: 0.3,
            alpha: 1.0,
            low_k: 2,
            high_k: 8,
            entropy_threshold: 0.6,
            eps: 0.1,
            min_samples: 1,
            top_per_cluster: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub embedding_model: String,
    pub top_k: usize,
    pub selection_strategy: SelectionStrategyKind,
    pub strategy_params: SelectionStrategyParams,
    pub min_score: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            embedding_model: "default".to_string(),
            top_k: 10,
            selection_strategy: SelectionStrategyKind::default(),
            strategy_params: SelectionStrategyParams::default(),
            min_score: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankingConfig {
    pub enabled: bool,
    pub model: String,
    pub top_k: usize,
}

impl Default for RerankingConfig {
    fn default() -> Self {
        Self { enabled: false, model: "default".to_string(), top_k: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleFilterConfig {
    pub enabled: bool,
    pub model: String,
    pub batch_size: usize,
    pub relevance_threshold: f32,
    pub max_rules: usize,
}

impl Default for RuleFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "default".to_string(),
            batch_size: 5,
            relevance_threshold: 0.5,
            max_rules: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackBehavior {
    #[default]
    Clarify,
    Stay,
    Escalate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFilterConfig {
    pub transition_threshold: f32,
    pub sanity_threshold: f32,
    pub min_margin: f32,
    pub entry_threshold: f32,
    pub stickiness_boost: f32,
    pub exit_intent_threshold: f32,
    pub llm_adjudication_enabled: bool,
    pub max_loop_count: usize,
    pub loop_detection_window: usize,
    pub relocalization_enabled: bool,
    pub relocalization_threshold: f32,
    pub relocalization_trigger_turns: u32,
    pub max_relocalization_hops: u32,
    pub fallback_behavior: FallbackBehavior,
    pub max_clarifications_per_step: u32,
}

impl Default for ScenarioFilterConfig {
    fn default() -> Self {
        Self {
            transition_threshold: 0.55,
            sanity_threshold: 0.4,
            min_margin: 0.1,
            entry_threshold: 0.6,
            stickiness_boost: 0.15,
            exit_intent_threshold: 0.85,
            llm_adjudication_enabled: true,
            max_loop_count: 3,
            loop_detection_window: 10,
            relocalization_enabled: true,
            relocalization_threshold: 0.7,
            relocalization_trigger_turns: 1,
            max_relocalization_hops: 2,
            fallback_behavior: FallbackBehavior::Clarify,
            max_clarifications_per_step: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionConfig {
    pub timeout_ms: u64,
    pub max_parallel: usize,
    pub fail_fast: bool,
}

impl Default for ToolExecutionConfig {
    fn default() -> Self {
        Self { timeout_ms: 5_000, max_parallel: 4, fail_fast: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { model: "default".to_string(), temperature: 0.3, max_tokens: 512 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceCheckConfig {
    pub enabled: bool,
    pub threshold: f32,
    pub refusal_bypass: bool,
}

impl Default for RelevanceCheckConfig {
    fn default() -> Self {
        Self { enabled: false, threshold: 0.3, refusal_bypass: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingCheckConfig {
    pub enabled: bool,
    pub threshold: f32,
}

impl Default for GroundingCheckConfig {
    fn default() -> Self {
        Self { enabled: false, threshold: 0.5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub deterministic_enabled: bool,
    pub llm_judge_enabled: bool,
    pub always_enforce_global: bool,
    pub relevance_check: RelevanceCheckConfig,
    pub grounding_check: GroundingCheckConfig,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 1,
            deterministic_enabled: true,
            llm_judge_enabled: true,
            always_enforce_global: true,
            relevance_check: RelevanceCheckConfig::default(),
            grounding_check: GroundingCheckConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GapFillConfig {
    pub use_threshold: f32,
    pub no_confirm_threshold: f32,
}

impl Default for GapFillConfig {
    fn default() -> Self {
        Self { use_threshold: 0.5, no_confirm_threshold: 0.85 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// How long a deployed plan's pending-migration markers are honored
    /// before being considered stale (days).
    pub deployment_retention_days: u32,
    pub gap_fill: GapFillConfig,
    pub re_routing_enabled: bool,
    pub checkpoint_enabled: bool,
    pub logging_enabled: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            deployment_retention_days: 90,
            gap_fill: GapFillConfig::default(),
            re_routing_enabled: true,
            checkpoint_enabled: true,
            logging_enabled: true,
        }
    }
}

/// Groups all eight stage configs (§6.3) plus the migration subsystem's
/// own config into one value so `Settings` can embed a single field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub context_extraction: ContextExtractionConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reranking: RerankingConfig,
    #[serde(default)]
    pub rule_filter: RuleFilterConfig,
    #[serde(default)]
    pub scenario_filter: ScenarioFilterConfig,
    #[serde(default)]
    pub tool_execution: ToolExecutionConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub enforcement: EnforcementConfig,
    #[serde(default)]
    pub migration: MigrationConfig,
}

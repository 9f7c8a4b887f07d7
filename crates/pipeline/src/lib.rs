//! The Turn Pipeline (§1, §2, §4): a per-message, bounded, multi-stage
//! orchestration over configurable probabilistic and deterministic
//! stages, wired against external LLM/embedding/rerank providers and
//! four persistent stores.
//!
//! Dependency order within this crate mirrors §2's leaf-to-root list:
//! `context` → `retrieval` → `rerank` → `rule_filter` → `scenario_filter`
//! → `tool_executor` → `generator` → `enforcer` → `migration` →
//! `orchestrator`. `idempotency` and `locking` are ambient concurrency
//! plumbing (§5) consumed only by `orchestrator`.

pub mod context;
pub mod enforcer;
pub mod generator;
pub mod idempotency;
pub mod locking;
pub mod migration;
pub mod orchestrator;
pub mod rerank;
pub mod retrieval;
pub mod rule_filter;
pub mod scenario_filter;
pub mod tool_executor;

pub use context::{Context, ContextExtractor, ScenarioSignal};
pub use enforcer::{EnforcementOutcome, Enforcer, Violation};
pub use generator::{GenerationResult, ResponseGenerator};
pub use orchestrator::{AlignmentRequest, AlignmentResult, PipelineOrchestrator, StageTiming};
pub use rule_filter::{MatchedRule, RuleFilter};
pub use scenario_filter::{NavigationAction, ScenarioNavigator};
pub use tool_executor::ToolExecutor;

//! TurnRecord entity (§3): the immutable, write-once audit copy of one
//! user-message / agent-response pair.

use crate::ids::{AgentId, RuleId, ScenarioId, SessionId, StepId, TenantId, ToolId, TurnId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of where the session's scenario pointer stood, recorded both
/// before and after the turn (§4.1 step 4, step 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioPointer {
    pub scenario_id: Option<ScenarioId>,
    pub step_id: Option<StepId>,
    pub version: Option<u32>,
}

impl ScenarioPointer {
    pub const fn empty() -> Self {
        Self { scenario_id: None, step_id: None, version: None }
    }
}

/// Record of one tool invocation, copied verbatim from the tool
/// executor's `ToolResult` (§4.7) into the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool_id: ToolId,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub session_id: SessionId,
    pub id: TurnId,
    pub turn_number: u64,
    pub user_message: String,
    pub agent_response: String,
    pub matched_rule_ids: Vec<RuleId>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub scenario_before: ScenarioPointer,
    pub scenario_after: ScenarioPointer,
    pub latency_ms: u64,
    pub tokens_used: u32,
    pub timestamp: DateTime<Utc>,
}

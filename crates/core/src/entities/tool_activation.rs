//! ToolActivation entity (§3).

use crate::ids::{AgentId, TenantId, ToolId};
use serde::{Deserialize, Serialize};

/// Per-tool policy overrides an agent may apply on top of the tool's own
/// defaults (§4.7's `timeout_ms`/`max_parallel`/`fail_fast` are pipeline-
/// wide; this is the per-tool enable/override layer).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolPolicyOverrides {
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolActivation {
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub tool_id: ToolId,
    pub enabled: bool,
    pub overrides: ToolPolicyOverrides,
}

//! Variable entity (§3): agent-authored variable definitions, distinct
//! from the runtime `session.variables` map in `crate::session`.

use crate::ids::VariableId;
use crate::tenant::AgentScoped;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    OnEachTurn,
    OnDemand,
    OnScenarioEntry,
    OnSessionStart,
}

/// How a `Variable`'s value is produced. `Static` covers constants set by
/// the operator; `ToolBacked`/`ExpressionBacked` describe a resolver
/// binding evaluated according to `refresh_policy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ResolverBinding {
    Static,
    ToolBacked { tool_id: crate::ids::ToolId },
    ExpressionBacked { expression: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDef {
    #[serde(flatten)]
    pub header: AgentScoped,
    pub id: VariableId,
    pub name: String,
    pub refresh_policy: RefreshPolicy,
    pub resolver: ResolverBinding,
}

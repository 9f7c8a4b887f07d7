//! Rule entity (§3).

use crate::ids::{RuleId, TemplateId, ToolId};
use crate::tenant::AgentScoped;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    Scenario,
    Step,
}

/// Identifies what a `Scenario`- or `Step`-scoped rule is scoped to. Kept
/// as a plain string id rather than a typed enum of `ScenarioId`/`StepId`
/// since a `Rule` does not otherwise know which kind of entity it refers
/// to until `scope` is inspected.
pub type ScopeId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    #[serde(flatten)]
    pub header: AgentScoped,
    pub id: RuleId,
    pub condition_text: String,
    pub action_text: String,
    pub scope: RuleScope,
    pub scope_id: Option<ScopeId>,
    pub is_hard_constraint: bool,
    pub enforcement_expression: Option<String>,
    /// Template this rule supplies to the generator (§4.8): its `mode`
    /// decides whether it bypasses the LLM entirely, is injected as a
    /// hint, or is reserved for enforcement fallback.
    pub template_id: Option<TemplateId>,
    pub attached_tool_ids: Vec<ToolId>,
    pub priority: i32,
    pub enabled: bool,
    pub max_fires_per_session: u32,
    pub cooldown_turns: u32,
    /// Precomputed embedding of `condition_text` (+ `action_text`).
    pub embedding: Vec<f32>,
}

impl Rule {
    /// Validate the scope/scope_id invariant from §3: non-GLOBAL rules
    /// must carry a `scope_id`.
    pub fn validate_scope(&self) -> Result<(), String> {
        if self.scope != RuleScope::Global && self.scope_id.is_none() {
            return Err(format!(
                "rule {} has scope {:?} but no scope_id",
                self.id, self.scope
            ));
        }
        Ok(())
    }

    pub fn is_unlimited_fires(&self) -> bool {
        self.max_fires_per_session == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AgentId, TenantId};

    fn base_rule(scope: RuleScope, scope_id: Option<ScopeId>) -> Rule {
        Rule {
            header: AgentScoped::new(TenantId::new(), AgentId::new()),
            id: RuleId::new(),
            condition_text: "c".into(),
            action_text: "a".into(),
            scope,
            scope_id,
            is_hard_constraint: false,
            enforcement_expression: None,
            template_id: None,
            attached_tool_ids: vec![],
            priority: 0,
            enabled: true,
            max_fires_per_session: 0,
            cooldown_turns: 0,
            embedding: vec![],
        }
    }

    #[test]
    fn scenario_scope_without_id_is_invalid() {
        let r = base_rule(RuleScope::Scenario, None);
        assert!(r.validate_scope().is_err());
    }

    #[test]
    fn global_scope_without_id_is_valid() {
        let r = base_rule(RuleScope::Global, None);
        assert!(r.validate_scope().is_ok());
    }
}

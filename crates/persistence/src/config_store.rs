//! In-memory `ConfigStore` (§6.1).

use align_core::entities::{Agent, MigrationPlan, Rule, RuleScope, Scenario, Template, ToolActivation, VariableDef};
use align_core::ids::{AgentId, MigrationPlanId, RuleId, ScenarioId, TemplateId, TenantId, ToolId, VariableId};
use align_core::stores::config_store::ScoredRule;
use align_core::stores::ConfigStore;
use align_core::vector::cosine_similarity;
use align_core::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryConfigStore {
    agents: DashMap<(TenantId, AgentId), Agent>,
    rules: DashMap<(TenantId, RuleId), Rule>,
    scenarios: DashMap<(TenantId, ScenarioId), Scenario>,
    archived_scenarios: DashMap<(TenantId, ScenarioId, u32), Scenario>,
    templates: DashMap<(TenantId, TemplateId), Template>,
    variables: DashMap<(TenantId, VariableId), VariableDef>,
    tool_activations: DashMap<(TenantId, AgentId, ToolId), ToolActivation>,
    migration_plans: DashMap<(TenantId, MigrationPlanId), MigrationPlan>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_agent(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Agent> {
        self.agents.get(&(tenant_id, agent_id)).map(|e| e.clone()).ok_or_else(|| Error::not_found(format!("agent {agent_id}")))
    }

    async fn save_agent(&self, agent: Agent) -> Result<()> {
        self.agents.insert((agent.header.tenant_id, agent.id), agent);
        Ok(())
    }

    async fn get_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> Result<Rule> {
        self.rules
            .get(&(tenant_id, rule_id))
            .map(|e| e.clone())
            .filter(|r| !r.header.is_deleted())
            .ok_or_else(|| Error::not_found(format!("rule {rule_id}")))
    }

    async fn save_rule(&self, rule: Rule) -> Result<()> {
        rule.validate_scope().map_err(Error::Validation)?;
        self.rules.insert((rule.header.tenant_id(), rule.id), rule);
        Ok(())
    }

    async fn soft_delete_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> Result<()> {
        let mut entry = self.rules.get_mut(&(tenant_id, rule_id)).ok_or_else(|| Error::not_found(format!("rule {rule_id}")))?;
        entry.header.soft_delete();
        Ok(())
    }

    async fn list_rules(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Rule>> {
        Ok(self
            .rules
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| r.header.tenant_id() == tenant_id && r.header.agent_id == agent_id && !r.header.is_deleted())
            .collect())
    }

    async fn vector_search_rules(
        &self,
        query_embedding: &[f32],
        tenant_id: TenantId,
        agent_id: AgentId,
        scope: Option<RuleScope>,
        scope_id: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredRule>> {
        let mut scored: Vec<ScoredRule> = self
            .rules
            .iter()
            .map(|e| e.value().clone())
            .filter(|r| r.header.tenant_id() == tenant_id && r.header.agent_id == agent_id && !r.header.is_deleted() && r.enabled)
            .filter(|r| match scope {
                None => true,
                Some(wanted) => r.scope == wanted && (scope_id.is_none() || r.scope_id.as_deref() == scope_id),
            })
            .map(|rule| {
                let score = cosine_similarity(query_embedding, &rule.embedding);
                ScoredRule { rule, score }
            })
            .filter(|s| s.score >= min_score)
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn get_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId) -> Result<Scenario> {
        self.scenarios
            .get(&(tenant_id, scenario_id))
            .map(|e| e.clone())
            .filter(|s| !s.header.is_deleted())
            .ok_or_else(|| Error::not_found(format!("scenario {scenario_id}")))
    }

    async fn save_scenario(&self, scenario: Scenario) -> Result<()> {
        let errors = scenario.validate();
        if !errors.is_empty() {
            return Err(Error::Validation(errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ")));
        }
        self.scenarios.insert((scenario.header.tenant_id(), scenario.id), scenario);
        Ok(())
    }

    async fn soft_delete_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId) -> Result<()> {
        let mut entry = self
            .scenarios
            .get_mut(&(tenant_id, scenario_id))
            .ok_or_else(|| Error::not_found(format!("scenario {scenario_id}")))?;
        entry.header.soft_delete();
        Ok(())
    }

    async fn list_scenarios(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Scenario>> {
        Ok(self
            .scenarios
            .iter()
            .map(|e| e.value().clone())
            .filter(|s| s.header.tenant_id() == tenant_id && s.header.agent_id == agent_id && !s.header.is_deleted())
            .collect())
    }

    async fn archive_scenario_version(&self, scenario: Scenario) -> Result<()> {
        self.archived_scenarios.insert((scenario.header.tenant_id(), scenario.id, scenario.version), scenario);
        Ok(())
    }

    async fn get_archived_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId, version: u32) -> Result<Scenario> {
        self.archived_scenarios
            .get(&(tenant_id, scenario_id, version))
            .map(|e| e.clone())
            .ok_or_else(|| Error::not_found(format!("scenario {scenario_id} v{version}")))
    }

    async fn get_template(&self, tenant_id: TenantId, template_id: TemplateId) -> Result<Template> {
        self.templates.get(&(tenant_id, template_id)).map(|e| e.clone()).ok_or_else(|| Error::not_found(format!("template {template_id}")))
    }

    async fn save_template(&self, template: Template) -> Result<()> {
        self.templates.insert((template.header.tenant_id(), template.id), template);
        Ok(())
    }

    async fn list_templates(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Template>> {
        Ok(self
            .templates
            .iter()
            .map(|e| e.value().clone())
            .filter(|t| t.header.tenant_id() == tenant_id && t.header.agent_id == agent_id)
            .collect())
    }

    async fn get_variable(&self, tenant_id: TenantId, variable_id: VariableId) -> Result<VariableDef> {
        self.variables.get(&(tenant_id, variable_id)).map(|e| e.clone()).ok_or_else(|| Error::not_found(format!("variable {variable_id}")))
    }

    async fn save_variable(&self, variable: VariableDef) -> Result<()> {
        self.variables.insert((variable.header.tenant_id(), variable.id), variable);
        Ok(())
    }

    async fn list_variables(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<VariableDef>> {
        Ok(self
            .variables
            .iter()
            .map(|e| e.value().clone())
            .filter(|v| v.header.tenant_id() == tenant_id && v.header.agent_id == agent_id)
            .collect())
    }

    async fn get_tool_activation(&self, tenant_id: TenantId, agent_id: AgentId, tool_id: ToolId) -> Result<Option<ToolActivation>> {
        Ok(self.tool_activations.get(&(tenant_id, agent_id, tool_id)).map(|e| e.clone()))
    }

    async fn save_tool_activation(&self, activation: ToolActivation) -> Result<()> {
        self.tool_activations.insert((activation.tenant_id, activation.agent_id, activation.tool_id), activation);
        Ok(())
    }

    async fn get_migration_plan(&self, tenant_id: TenantId, plan_id: MigrationPlanId) -> Result<MigrationPlan> {
        self.migration_plans.get(&(tenant_id, plan_id)).map(|e| e.clone()).ok_or_else(|| Error::not_found(format!("migration plan {plan_id}")))
    }

    async fn save_migration_plan(&self, plan: MigrationPlan) -> Result<()> {
        self.migration_plans.insert((plan.tenant_id, plan.id), plan);
        Ok(())
    }

    async fn find_migration_plan(&self, tenant_id: TenantId, scenario_id: ScenarioId, from_version: u32, to_version: u32) -> Result<Option<MigrationPlan>> {
        Ok(self
            .migration_plans
            .iter()
            .map(|e| e.value().clone())
            .find(|p| p.tenant_id == tenant_id && p.scenario_id == scenario_id && p.from_version == from_version && p.to_version == to_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::entities::{ScenarioStep, StepTransition, StepType};
    use align_core::ids::StepId;
    use align_core::tenant::AgentScoped;

    fn rule(tenant: TenantId, agent: AgentId, scope: RuleScope, embedding: Vec<f32>) -> Rule {
        Rule {
            header: AgentScoped::new(tenant, agent),
            id: RuleId::new(),
            condition_text: "c".into(),
            action_text: "a".into(),
            scope,
            scope_id: if scope == RuleScope::Global { None } else { Some("s1".into()) },
            is_hard_constraint: false,
            enforcement_expression: None,
            template_id: None,
            attached_tool_ids: vec![],
            priority: 0,
            enabled: true,
            max_fires_per_session: 0,
            cooldown_turns: 0,
            embedding,
        }
    }

    #[tokio::test]
    async fn vector_search_respects_tenant_and_scope() {
        let store = InMemoryConfigStore::new();
        let tenant = TenantId::new();
        let agent = AgentId::new();
        let other_tenant = TenantId::new();

        store.save_rule(rule(tenant, agent, RuleScope::Global, vec![1.0, 0.0])).await.unwrap();
        store.save_rule(rule(other_tenant, agent, RuleScope::Global, vec![1.0, 0.0])).await.unwrap();

        let results = store.vector_search_rules(&[1.0, 0.0], tenant, agent, None, None, 10, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule.header.tenant_id(), tenant);
    }

    #[tokio::test]
    async fn soft_deleted_rule_excluded_from_search() {
        let store = InMemoryConfigStore::new();
        let tenant = TenantId::new();
        let agent = AgentId::new();
        let r = rule(tenant, agent, RuleScope::Global, vec![1.0]);
        let id = r.id;
        store.save_rule(r).await.unwrap();
        store.soft_delete_rule(tenant, id).await.unwrap();

        let results = store.vector_search_rules(&[1.0], tenant, agent, None, None, 10, 0.0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn scoped_rule_without_scope_id_is_rejected() {
        let store = InMemoryConfigStore::new();
        let mut r = rule(TenantId::new(), AgentId::new(), RuleScope::Scenario, vec![]);
        r.scope_id = None;
        assert!(store.save_rule(r).await.is_err());
    }

    #[tokio::test]
    async fn invalid_scenario_graph_is_rejected() {
        let store = InMemoryConfigStore::new();
        let tenant = TenantId::new();
        let agent = AgentId::new();
        let entry = StepId::new();
        let scenario = Scenario {
            header: AgentScoped::new(tenant, agent),
            id: ScenarioId::new(),
            version: 1,
            entry_step_id: entry,
            entry_examples: vec![],
            entry_example_embeddings: vec![],
            intent_label: None,
            steps: vec![ScenarioStep {
                id: entry,
                step_type: StepType::Interaction,
                description: None,
                local_rule_ids: vec![],
                required_fields: vec![],
                transitions: vec![StepTransition { target_step_id: StepId::new(), condition: None, intent_match: None, llm_adjudication_hint: None }],
            }],
        };
        assert!(store.save_scenario(scenario).await.is_err());
    }
}

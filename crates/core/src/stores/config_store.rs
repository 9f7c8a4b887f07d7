//! `ConfigStore` (§6.1): CRUD + soft-delete for the operator-authored
//! configuration graph, plus the vector search rule retrieval leans on.

use crate::entities::{Agent, MigrationPlan, Rule, RuleScope, Scenario, Template, VariableDef};
use crate::ids::{AgentId, MigrationPlanId, RuleId, ScenarioId, TemplateId, TenantId, VariableId};
use crate::Result;
use async_trait::async_trait;

/// One scored candidate returned by `vector_search_rules`.
#[derive(Debug, Clone)]
pub struct ScoredRule {
    pub rule: Rule,
    pub score: f32,
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_agent(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Agent>;
    async fn save_agent(&self, agent: Agent) -> Result<()>;

    async fn get_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> Result<Rule>;
    async fn save_rule(&self, rule: Rule) -> Result<()>;
    async fn soft_delete_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> Result<()>;
    async fn list_rules(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Rule>>;

    /// Scoped, ranked rule retrieval (§4.3). `scope_id` narrows to a
    /// specific `ScenarioId`/`StepId` string when `scope` is non-`None`;
    /// a `None` scope fetches GLOBAL rules.
    async fn vector_search_rules(
        &self,
        query_embedding: &[f32],
        tenant_id: TenantId,
        agent_id: AgentId,
        scope: Option<RuleScope>,
        scope_id: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredRule>>;

    async fn get_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId) -> Result<Scenario>;
    async fn save_scenario(&self, scenario: Scenario) -> Result<()>;
    async fn soft_delete_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId) -> Result<()>;
    async fn list_scenarios(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Scenario>>;

    /// Archive the currently-published version before a new one replaces
    /// it (§4.9 needs both versions to diff).
    async fn archive_scenario_version(&self, scenario: Scenario) -> Result<()>;
    async fn get_archived_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId, version: u32) -> Result<Scenario>;

    async fn get_template(&self, tenant_id: TenantId, template_id: TemplateId) -> Result<Template>;
    async fn save_template(&self, template: Template) -> Result<()>;
    async fn list_templates(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Template>>;

    async fn get_variable(&self, tenant_id: TenantId, variable_id: VariableId) -> Result<VariableDef>;
    async fn save_variable(&self, variable: VariableDef) -> Result<()>;
    async fn list_variables(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<VariableDef>>;

    async fn get_tool_activation(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        tool_id: crate::ids::ToolId,
    ) -> Result<Option<crate::entities::ToolActivation>>;
    async fn save_tool_activation(&self, activation: crate::entities::ToolActivation) -> Result<()>;

    async fn get_migration_plan(&self, tenant_id: TenantId, plan_id: MigrationPlanId) -> Result<MigrationPlan>;
    async fn save_migration_plan(&self, plan: MigrationPlan) -> Result<()>;
    async fn find_migration_plan(
        &self,
        tenant_id: TenantId,
        scenario_id: ScenarioId,
        from_version: u32,
        to_version: u32,
    ) -> Result<Option<MigrationPlan>>;
}

//! `HybridConfigStore`: a `ConfigStore` decorator that keeps a tantivy
//! BM25 index over rule text alongside whatever dense `vector_search_rules`
//! the wrapped store already provides, and fuses the two with
//! `reciprocal_rank_fusion` per the `Retriever`'s note that "a production
//! backend is free to fuse dense + sparse internally".
//!
//! The `ConfigStore` trait's `vector_search_rules` only carries a query
//! *embedding* (the pipeline never has raw query text at that call site),
//! so this decorator still answers that call with dense-only scoring for
//! trait-object compatibility, and exposes the true hybrid fusion as the
//! additional `search_rules_hybrid` method for callers that hold both the
//! text and the embedding (e.g. immediately after context extraction).

use align_core::entities::{Agent, MigrationPlan, Rule, RuleScope, Scenario, Template, ToolActivation, VariableDef};
use align_core::ids::{AgentId, MigrationPlanId, RuleId, ScenarioId, TemplateId, TenantId, ToolId, VariableId};
use align_core::stores::config_store::ScoredRule;
use align_core::stores::ConfigStore;
use align_core::vector::reciprocal_rank_fusion;
use align_core::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Schema, Value, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, TantivyDocument};

struct RuleFields {
    rule_id: Field,
    tenant_id: Field,
    agent_id: Field,
    text: Field,
}

pub struct HybridConfigStore {
    inner: Arc<dyn ConfigStore>,
    index: Index,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    fields: RuleFields,
}

impl HybridConfigStore {
    pub fn new(inner: Arc<dyn ConfigStore>) -> Result<Self> {
        let mut builder = Schema::builder();
        let rule_id = builder.add_text_field("rule_id", STRING | STORED);
        let tenant_id = builder.add_text_field("tenant_id", STRING | STORED);
        let agent_id = builder.add_text_field("agent_id", STRING | STORED);
        let text = builder.add_text_field("text", TEXT);
        let schema = builder.build();

        let index = Index::create_in_ram(schema);
        let writer = index.writer(15_000_000).map_err(|e| Error::internal(format!("opening tantivy writer: {e}")))?;
        let reader = index.reader().map_err(|e| Error::internal(format!("opening tantivy reader: {e}")))?;

        Ok(Self { inner, index, writer: Mutex::new(writer), reader, fields: RuleFields { rule_id, tenant_id, agent_id, text } })
    }

    fn index_rule(&self, rule: &Rule) -> Result<()> {
        self.remove_rule_from_index(rule.id)?;
        if rule.header.is_deleted() || !rule.enabled {
            return Ok(());
        }
        let mut writer = self.writer.lock();
        writer
            .add_document(doc!(
                self.fields.rule_id => rule.id.to_string(),
                self.fields.tenant_id => rule.header.tenant_id().to_string(),
                self.fields.agent_id => rule.header.agent_id.to_string(),
                self.fields.text => format!("{} {}", rule.condition_text, rule.action_text),
            ))
            .map_err(|e| Error::internal(format!("indexing rule {}: {e}", rule.id)))?;
        writer.commit().map_err(|e| Error::internal(format!("committing rule index: {e}")))?;
        Ok(())
    }

    fn remove_rule_from_index(&self, rule_id: RuleId) -> Result<()> {
        let term = tantivy::Term::from_field_text(self.fields.rule_id, &rule_id.to_string());
        let mut writer = self.writer.lock();
        writer.delete_term(term);
        writer.commit().map_err(|e| Error::internal(format!("committing rule deletion: {e}")))?;
        Ok(())
    }

    /// Sparse (BM25) candidate rule ids for `query_text`, best first,
    /// already narrowed to `tenant_id`/`agent_id`.
    fn search_text(&self, query_text: &str, tenant_id: TenantId, agent_id: AgentId, limit: usize) -> Result<Vec<RuleId>> {
        if query_text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let searcher = self.reader.searcher();
        let parser = QueryParser::for_index(&self.index, vec![self.fields.text]);
        let query = parser.parse_query(query_text).map_err(|e| Error::internal(format!("parsing rule query text: {e}")))?;
        let top_docs = searcher.search(&query, &TopDocs::with_limit(limit * 4 + 16)).map_err(|e| Error::internal(format!("searching rule text index: {e}")))?;

        let tenant_str = tenant_id.to_string();
        let agent_str = agent_id.to_string();
        let mut out = Vec::new();
        for (_score, address) in top_docs {
            let retrieved: TantivyDocument = searcher.doc(address).map_err(|e| Error::internal(format!("fetching rule doc: {e}")))?;
            let doc_tenant = retrieved.get_first(self.fields.tenant_id).and_then(|v| v.as_str());
            let doc_agent = retrieved.get_first(self.fields.agent_id).and_then(|v| v.as_str());
            if doc_tenant != Some(tenant_str.as_str()) || doc_agent != Some(agent_str.as_str()) {
                continue;
            }
            if let Some(id_str) = retrieved.get_first(self.fields.rule_id).and_then(|v| v.as_str()) {
                if let Ok(id) = id_str.parse::<RuleId>() {
                    out.push(id);
                }
            }
        }
        out.truncate(limit);
        Ok(out)
    }

    /// True hybrid retrieval (§4.3): dense ranking from the wrapped
    /// store's `vector_search_rules`, fused via reciprocal rank fusion
    /// with sparse BM25 ranking over `condition_text`/`action_text`.
    pub async fn search_rules_hybrid(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        tenant_id: TenantId,
        agent_id: AgentId,
        scope: Option<RuleScope>,
        scope_id: Option<&str>,
        limit: usize,
        min_score: f32,
    ) -> Result<Vec<ScoredRule>> {
        let dense = self.inner.vector_search_rules(query_embedding, tenant_id, agent_id, scope, scope_id, limit.max(1) * 4, 0.0).await?;
        let dense_ids: Vec<RuleId> = dense.iter().map(|s| s.rule.id).collect();
        let sparse_ids = self.search_text(query_text, tenant_id, agent_id, limit.max(1) * 4)?;

        let fused = reciprocal_rank_fusion(&[dense_ids, sparse_ids], 60.0);

        let mut out = Vec::with_capacity(fused.len());
        for (rule_id, score) in fused {
            if score < min_score {
                continue;
            }
            if let Some(scored) = dense.iter().find(|s| s.rule.id == rule_id) {
                out.push(ScoredRule { rule: scored.rule.clone(), score });
                continue;
            }
            if let Ok(rule) = self.inner.get_rule(tenant_id, rule_id).await {
                let matches_scope = match scope {
                    None => true,
                    Some(wanted) => rule.scope == wanted && (scope_id.is_none() || rule.scope_id.as_deref() == scope_id),
                };
                if rule.enabled && matches_scope {
                    out.push(ScoredRule { rule, score });
                }
            }
            if out.len() >= limit {
                break;
            }
        }
        out.truncate(limit);
        Ok(out)
    }
}

#[async_trait]
impl ConfigStore for HybridConfigStore {
    async fn get_agent(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Agent> {
        self.inner.get_agent(tenant_id, agent_id).await
    }

    async fn save_agent(&self, agent: Agent) -> Result<()> {
        self.inner.save_agent(agent).await
    }

    async fn get_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> Result<Rule> {
        self.inner.get_rule(tenant_id, rule_id).await
    }

    async fn save_rule(&self, rule: Rule) -> Result<()> {
        self.inner.save_rule(rule.clone()).await?;
        self.index_rule(&rule)
    }

    async fn soft_delete_rule(&self, tenant_id: TenantId, rule_id: RuleId) -> Result<()> {
        self.inner.soft_delete_rule(tenant_id, rule_id).await?;
        self.remove_rule_from_index(rule_id)
    }

    async fn list_rules(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Rule>> {
        self.inner.list_rules(tenant_id, agent_id).await
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
        self.inner.vector_search_rules(query_embedding, tenant_id, agent_id, scope, scope_id, limit, min_score).await
    }

    async fn get_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId) -> Result<Scenario> {
        self.inner.get_scenario(tenant_id, scenario_id).await
    }

    async fn save_scenario(&self, scenario: Scenario) -> Result<()> {
        self.inner.save_scenario(scenario).await
    }

    async fn soft_delete_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId) -> Result<()> {
        self.inner.soft_delete_scenario(tenant_id, scenario_id).await
    }

    async fn list_scenarios(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Scenario>> {
        self.inner.list_scenarios(tenant_id, agent_id).await
    }

    async fn archive_scenario_version(&self, scenario: Scenario) -> Result<()> {
        self.inner.archive_scenario_version(scenario).await
    }

    async fn get_archived_scenario(&self, tenant_id: TenantId, scenario_id: ScenarioId, version: u32) -> Result<Scenario> {
        self.inner.get_archived_scenario(tenant_id, scenario_id, version).await
    }

    async fn get_template(&self, tenant_id: TenantId, template_id: TemplateId) -> Result<Template> {
        self.inner.get_template(tenant_id, template_id).await
    }

    async fn save_template(&self, template: Template) -> Result<()> {
        self.inner.save_template(template).await
    }

    async fn list_templates(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Template>> {
        self.inner.list_templates(tenant_id, agent_id).await
    }

    async fn get_variable(&self, tenant_id: TenantId, variable_id: VariableId) -> Result<VariableDef> {
        self.inner.get_variable(tenant_id, variable_id).await
    }

    async fn save_variable(&self, variable: VariableDef) -> Result<()> {
        self.inner.save_variable(variable).await
    }

    async fn list_variables(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<VariableDef>> {
        self.inner.list_variables(tenant_id, agent_id).await
    }

    async fn get_tool_activation(&self, tenant_id: TenantId, agent_id: AgentId, tool_id: ToolId) -> Result<Option<ToolActivation>> {
        self.inner.get_tool_activation(tenant_id, agent_id, tool_id).await
    }

    async fn save_tool_activation(&self, activation: ToolActivation) -> Result<()> {
        self.inner.save_tool_activation(activation).await
    }

    async fn get_migration_plan(&self, tenant_id: TenantId, plan_id: MigrationPlanId) -> Result<MigrationPlan> {
        self.inner.get_migration_plan(tenant_id, plan_id).await
    }

    async fn save_migration_plan(&self, plan: MigrationPlan) -> Result<()> {
        self.inner.save_migration_plan(plan).await
    }

    async fn find_migration_plan(&self, tenant_id: TenantId, scenario_id: ScenarioId, from_version: u32, to_version: u32) -> Result<Option<MigrationPlan>> {
        self.inner.find_migration_plan(tenant_id, scenario_id, from_version, to_version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::tenant::AgentScoped;
    use align_persistence::InMemoryConfigStore;

    fn in_memory_config_store() -> Arc<dyn ConfigStore> {
        Arc::new(InMemoryConfigStore::new())
    }

    fn rule(tenant: TenantId, agent: AgentId, condition: &str, action: &str) -> Rule {
        Rule {
            header: AgentScoped::new(tenant, agent),
            id: RuleId::new(),
            condition_text: condition.to_string(),
            action_text: action.to_string(),
            scope: RuleScope::Global,
            scope_id: None,
            is_hard_constraint: false,
            enforcement_expression: None,
            template_id: None,
            attached_tool_ids: vec![],
            priority: 0,
            enabled: true,
            max_fires_per_session: 0,
            cooldown_turns: 0,
            embedding: vec![0.0],
        }
    }

    #[tokio::test]
    async fn text_only_match_is_found_via_sparse_fusion() {
        let inner = in_memory_config_store();
        let tenant = TenantId::new();
        let agent = AgentId::new();
        let r = rule(tenant, agent, "customer asks about refund policy", "explain the 30 day refund window");
        let rule_id = r.id;
        let store = HybridConfigStore::new(inner).unwrap();
        store.save_rule(r).await.unwrap();

        let results = store.search_rules_hybrid("refund policy", &[0.0], tenant, agent, None, None, 5, 0.0).await.unwrap();
        assert!(results.iter().any(|s| s.rule.id == rule_id));
    }

    #[tokio::test]
    async fn soft_deleting_a_rule_removes_it_from_the_text_index() {
        let inner = in_memory_config_store();
        let tenant = TenantId::new();
        let agent = AgentId::new();
        let r = rule(tenant, agent, "customer asks for a human", "escalate to a human agent");
        let rule_id = r.id;
        let store = HybridConfigStore::new(inner).unwrap();
        store.save_rule(r).await.unwrap();
        store.soft_delete_rule(tenant, rule_id).await.unwrap();

        let results = store.search_rules_hybrid("human agent", &[0.0], tenant, agent, None, None, 5, 0.0).await.unwrap();
        assert!(results.iter().all(|s| s.rule.id != rule_id));
    }
}

//! `MigrationExecutor` (§4.9): just-in-time reconciliation run at the
//! start of every turn for a session carrying a `pending_migration`.
//! Single-hop anchors are resolved directly against the plan's
//! `TransformationMap`; sessions more than one published version behind
//! are handed to `CompositeMapper` instead.

use super::{CompositeMapper, GapFillService};
use align_core::entities::AnchorPolicy;
use align_core::ids::{ScenarioId, StepId, TenantId};
use align_core::session::Session;
use align_core::stores::{ConfigStore, ProfileStore};
use align_core::{Error, Result};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconciliationOutcome {
    /// No `pending_migration` on the session; nothing to do.
    NoOp,
    /// The session was moved to the target version's anchor step.
    Teleported { scenario_id: ScenarioId, step_id: StepId, version: u32 },
    /// A `GAP_FILL` anchor still has unresolved fields after tiered
    /// resolution; the orchestrator should ask the customer and retry
    /// next turn. `pending_migration` is left in place.
    NeedsFields { fields: Vec<String> },
    /// A `RE_ROUTE` anchor requires explicit customer confirmation before
    /// teleporting past `checkpoint_step_id`.
    NeedsReRouteConfirmation { checkpoint_step_id: StepId },
}

pub struct MigrationExecutor {
    config_store: Arc<dyn ConfigStore>,
    profile_store: Arc<dyn ProfileStore>,
    gap_fill: GapFillService,
    composite: CompositeMapper,
}

impl MigrationExecutor {
    pub fn new(config_store: Arc<dyn ConfigStore>, profile_store: Arc<dyn ProfileStore>, gap_fill: GapFillService) -> Self {
        let composite = CompositeMapper::new(config_store.clone());
        Self { config_store, profile_store, gap_fill, composite }
    }

    /// Reconcile `session` in place. Call before running the rest of the
    /// Turn Pipeline (§4.1 step 3); a `NeedsFields`/`NeedsReRouteConfirmation`
    /// outcome should short-circuit straight to generation instead of
    /// continuing on to retrieval/rerank/rule filtering.
    #[tracing::instrument(skip(self, session, recent_message), fields(session_id = %session.id))]
    pub async fn reconcile(&self, tenant_id: TenantId, session: &mut Session, recent_message: &str) -> Result<ReconciliationOutcome> {
        let Some(pending) = session.pending_migration.clone() else {
            return Ok(ReconciliationOutcome::NoOp);
        };

        let plan = self.config_store.get_migration_plan(tenant_id, pending.plan_id).await?;
        let current_scenario = self.config_store.get_scenario(tenant_id, plan.scenario_id).await?;

        let (final_step_id, required_fields, re_route_checkpoint, target_version) = if current_scenario.version > plan.to_version {
            let composite = self
                .composite
                .compose(tenant_id, plan.scenario_id, plan.from_version, current_scenario.version, &pending.anchor_hash, &current_scenario)
                .await?;
            (composite.final_step_id, composite.requested_fields, composite.re_route_checkpoint, current_scenario.version)
        } else {
            let anchor = plan.transformation_map.anchor_for_hash(&pending.anchor_hash).ok_or_else(|| {
                Error::Migration(format!("pending anchor {} not found in plan {}", pending.anchor_hash, plan.id))
            })?;
            match &anchor.policy {
                AnchorPolicy::CleanGraft => (anchor.v2_step_id, Vec::new(), None, plan.to_version),
                AnchorPolicy::GapFill { required_fields } => (anchor.v2_step_id, required_fields.clone(), None, plan.to_version),
                AnchorPolicy::ReRoute { checkpoint_step_id } => (anchor.v2_step_id, Vec::new(), Some(*checkpoint_step_id), plan.to_version),
            }
        };

        if let Some(checkpoint_step_id) = re_route_checkpoint {
            return Ok(ReconciliationOutcome::NeedsReRouteConfirmation { checkpoint_step_id });
        }

        if required_fields.is_empty() {
            return Ok(self.teleport(session, plan.scenario_id, final_step_id, target_version));
        }

        let profile = self.profile_store.get(tenant_id, session.customer_profile_id).await?;
        let resolutions = self.gap_fill.resolve(tenant_id, &profile, &session.variables, recent_message, &required_fields).await?;
        for resolution in &resolutions {
            if let Some(value) = &resolution.value {
                session.variables.insert(resolution.name.clone(), value.clone());
            }
        }

        let unresolved = GapFillService::unresolved(&resolutions);
        if unresolved.is_empty() {
            Ok(self.teleport(session, plan.scenario_id, final_step_id, target_version))
        } else {
            Ok(ReconciliationOutcome::NeedsFields { fields: unresolved })
        }
    }

    fn teleport(&self, session: &mut Session, scenario_id: ScenarioId, step_id: StepId, version: u32) -> ReconciliationOutcome {
        session.start_scenario(scenario_id, step_id, version);
        session.pending_migration = None;
        ReconciliationOutcome::Teleported { scenario_id, step_id, version }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_config::GapFillConfig;
    use align_core::entities::{
        AnchorMapping, CustomerProfile, FieldSource, MigrationPlan, MigrationPlanStatus, Scenario, ScenarioStep,
        StepType, TransformationMap,
    };
    use align_core::ids::{AgentId, MigrationPlanId, ProfileId};
    use align_core::providers::{ChatMessage, GenerationResponse, LlmProvider, TextChunk};
    use align_core::session::PendingMigration;
    use align_core::tenant::AgentScoped;
    use async_trait::async_trait;
    use chrono::Utc;
    use futures::stream::BoxStream;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct FakeStore {
        plans: HashMap<MigrationPlanId, MigrationPlan>,
        scenario: Scenario,
        profile: Mutex<CustomerProfile>,
    }

    #[async_trait]
    impl ConfigStore for FakeStore {
        async fn get_agent(&self, _t: TenantId, _a: AgentId) -> Result<align_core::entities::Agent> {
            unimplemented!()
        }
        async fn save_agent(&self, _a: align_core::entities::Agent) -> Result<()> {
            unimplemented!()
        }
        async fn get_rule(&self, _t: TenantId, _r: align_core::ids::RuleId) -> Result<align_core::entities::Rule> {
            unimplemented!()
        }
        async fn save_rule(&self, _r: align_core::entities::Rule) -> Result<()> {
            unimplemented!()
        }
        async fn soft_delete_rule(&self, _t: TenantId, _r: align_core::ids::RuleId) -> Result<()> {
            unimplemented!()
        }
        async fn list_rules(&self, _t: TenantId, _a: AgentId) -> Result<Vec<align_core::entities::Rule>> {
            unimplemented!()
        }
        async fn vector_search_rules(
            &self,
            _q: &[f32],
            _t: TenantId,
            _a: AgentId,
            _s: Option<align_core::entities::RuleScope>,
            _sid: Option<&str>,
            _l: usize,
            _m: f32,
        ) -> Result<Vec<align_core::stores::config_store::ScoredRule>> {
            unimplemented!()
        }
        async fn get_scenario(&self, _t: TenantId, _s: ScenarioId) -> Result<Scenario> {
            Ok(self.scenario.clone())
        }
        async fn save_scenario(&self, _s: Scenario) -> Result<()> {
            unimplemented!()
        }
        async fn soft_delete_scenario(&self, _t: TenantId, _s: ScenarioId) -> Result<()> {
            unimplemented!()
        }
        async fn list_scenarios(&self, _t: TenantId, _a: AgentId) -> Result<Vec<Scenario>> {
            unimplemented!()
        }
        async fn archive_scenario_version(&self, _s: Scenario) -> Result<()> {
            unimplemented!()
        }
        async fn get_archived_scenario(&self, _t: TenantId, _s: ScenarioId, _v: u32) -> Result<Scenario> {
            unimplemented!()
        }
        async fn get_template(&self, _t: TenantId, _tpl: align_core::ids::TemplateId) -> Result<align_core::entities::Template> {
            unimplemented!()
        }
        async fn save_template(&self, _t: align_core::entities::Template) -> Result<()> {
            unimplemented!()
        }
        async fn list_templates(&self, _t: TenantId, _a: AgentId) -> Result<Vec<align_core::entities::Template>> {
            unimplemented!()
        }
        async fn get_variable(&self, _t: TenantId, _v: align_core::ids::VariableId) -> Result<align_core::entities::VariableDef> {
            unimplemented!()
        }
        async fn save_variable(&self, _v: align_core::entities::VariableDef) -> Result<()> {
            unimplemented!()
        }
        async fn list_variables(&self, _t: TenantId, _a: AgentId) -> Result<Vec<align_core::entities::VariableDef>> {
            unimplemented!()
        }
        async fn get_tool_activation(
            &self,
            _t: TenantId,
            _a: AgentId,
            _tool: align_core::ids::ToolId,
        ) -> Result<Option<align_core::entities::ToolActivation>> {
            unimplemented!()
        }
        async fn save_tool_activation(&self, _a: align_core::entities::ToolActivation) -> Result<()> {
            unimplemented!()
        }
        async fn get_migration_plan(&self, _t: TenantId, plan_id: MigrationPlanId) -> Result<MigrationPlan> {
            self.plans.get(&plan_id).cloned().ok_or_else(|| Error::not_found("plan"))
        }
        async fn save_migration_plan(&self, _p: MigrationPlan) -> Result<()> {
            unimplemented!()
        }
        async fn find_migration_plan(&self, _t: TenantId, _s: ScenarioId, _f: u32, _to: u32) -> Result<Option<MigrationPlan>> {
            unimplemented!()
        }
    }

    struct FakeProfileStore {
        profile: CustomerProfile,
    }

    #[async_trait]
    impl ProfileStore for FakeProfileStore {
        async fn get(&self, _t: TenantId, _p: ProfileId) -> Result<CustomerProfile> {
            Ok(self.profile.clone())
        }
        async fn get_by_channel(&self, _t: TenantId, _a: AgentId, _c: &str, _u: &str) -> Result<Option<CustomerProfile>> {
            unimplemented!()
        }
        async fn get_or_create(&self, _t: TenantId, _a: AgentId, _c: &str, _u: &str, _s: u32) -> Result<CustomerProfile> {
            unimplemented!()
        }
        async fn update_field(
            &self,
            _t: TenantId,
            _p: ProfileId,
            _f: &str,
            _v: align_core::variable::VarValue,
            _c: f32,
            _s: FieldSource,
        ) -> Result<()> {
            Ok(())
        }
        async fn add_asset(&self, _t: TenantId, _p: ProfileId, _a: &str) -> Result<()> {
            unimplemented!()
        }
        async fn link_channel(&self, _t: TenantId, _p: ProfileId, _c: &str, _u: &str) -> Result<()> {
            unimplemented!()
        }
        async fn merge(&self, _t: TenantId, _target: ProfileId, _source: ProfileId) -> Result<CustomerProfile> {
            unimplemented!()
        }
    }

    struct NoopLlm;

    #[async_trait]
    impl LlmProvider for NoopLlm {
        async fn generate(
            &self,
            _messages: &[ChatMessage],
            _model: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
            _stop: Option<&[String]>,
        ) -> Result<GenerationResponse> {
            Ok(GenerationResponse { text: "{\"value\": null, \"confidence\": 0.0}".to_string(), tokens: 10 })
        }
        async fn generate_stream(
            &self,
            _messages: &[ChatMessage],
            _model: Option<&str>,
            _max_tokens: u32,
            _temperature: f32,
            _stop: Option<&[String]>,
        ) -> Result<BoxStream<'static, Result<TextChunk>>> {
            unimplemented!()
        }
        async fn count_tokens(&self, text: &str) -> Result<u32> {
            Ok(text.len() as u32)
        }
    }

    fn step(id: StepId) -> ScenarioStep {
        ScenarioStep { id, step_type: StepType::Interaction, description: None, local_rule_ids: vec![], required_fields: vec![], transitions: vec![] }
    }

    fn plan(scenario_id: ScenarioId, anchors: Vec<AnchorMapping>) -> MigrationPlan {
        MigrationPlan {
            id: MigrationPlanId::new(),
            tenant_id: TenantId::new(),
            agent_id: AgentId::new(),
            scenario_id,
            from_version: 1,
            to_version: 2,
            transformation_map: TransformationMap { anchors },
            scope_filter: None,
            warnings: vec![],
            summary: String::new(),
            status: MigrationPlanStatus::Deployed,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn clean_graft_teleports_and_clears_pending() {
        let tenant_id = TenantId::new();
        let scenario_id = ScenarioId::new();
        let v1_step = StepId::new();
        let v2_step = StepId::new();
        let anchor_hash = "hash1".to_string();

        let plan = plan(
            scenario_id,
            vec![AnchorMapping { v1_step_id: v1_step, v2_step_id: v2_step, anchor_hash: anchor_hash.clone(), policy: AnchorPolicy::CleanGraft }],
        );
        let plan_id = plan.id;

        let scenario = Scenario {
            header: AgentScoped::new(tenant_id, AgentId::new()),
            id: scenario_id,
            version: 2,
            entry_step_id: v2_step,
            entry_examples: vec![],
            entry_example_embeddings: vec![],
            intent_label: None,
            steps: vec![step(v2_step)],
        };

        let mut plans = HashMap::new();
        plans.insert(plan_id, plan);
        let profile = CustomerProfile {
            header: AgentScoped::new(tenant_id, AgentId::new()),
            id: ProfileId::new(),
            agent_id: AgentId::new(),
            channel_identities: vec![],
            fields: HashMap::new(),
            schema_version: 1,
        };

        let config_store = Arc::new(FakeStore { plans, scenario, profile: Mutex::new(profile.clone()) });
        let profile_store = Arc::new(FakeProfileStore { profile });
        let gap_fill = GapFillService::new(profile_store.clone(), Arc::new(NoopLlm), GapFillConfig::default());
        let executor = MigrationExecutor::new(config_store, profile_store, gap_fill);

        let mut session = Session::new(tenant_id, AgentId::new(), ProfileId::new(), "web", "u1");
        session.pending_migration = Some(PendingMigration { plan_id, anchor_hash });

        let outcome = executor.reconcile(tenant_id, &mut session, "hi").await.unwrap();
        assert_eq!(outcome, ReconciliationOutcome::Teleported { scenario_id, step_id: v2_step, version: 2 });
        assert!(session.pending_migration.is_none());
        assert_eq!(session.active_step_id, Some(v2_step));
    }

    #[tokio::test]
    async fn no_pending_migration_is_a_noop() {
        let tenant_id = TenantId::new();
        let scenario_id = ScenarioId::new();
        let scenario = Scenario {
            header: AgentScoped::new(tenant_id, AgentId::new()),
            id: scenario_id,
            version: 1,
            entry_step_id: StepId::new(),
            entry_examples: vec![],
            entry_example_embeddings: vec![],
            intent_label: None,
            steps: vec![],
        };
        let profile = CustomerProfile {
            header: AgentScoped::new(tenant_id, AgentId::new()),
            id: ProfileId::new(),
            agent_id: AgentId::new(),
            channel_identities: vec![],
            fields: HashMap::new(),
            schema_version: 1,
        };
        let config_store = Arc::new(FakeStore { plans: HashMap::new(), scenario, profile: Mutex::new(profile.clone()) });
        let profile_store = Arc::new(FakeProfileStore { profile });
        let gap_fill = GapFillService::new(profile_store.clone(), Arc::new(NoopLlm), GapFillConfig::default());
        let executor = MigrationExecutor::new(config_store, profile_store, gap_fill);

        let mut session = Session::new(tenant_id, AgentId::new(), ProfileId::new(), "web", "u1");
        let outcome = executor.reconcile(tenant_id, &mut session, "hi").await.unwrap();
        assert_eq!(outcome, ReconciliationOutcome::NoOp);
    }
}

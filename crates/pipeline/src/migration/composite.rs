//! `CompositeMapper` (§4.9, §8 scenario 6): when a session is more than
//! one published version behind, walk the chain of intermediate plans
//! rather than require one plan per version gap. Anchors are, by
//! definition, steps whose `content_hash` does not change across a
//! version boundary, so the same anchor hash is expected to thread
//! through every hop in the chain; the mapper accumulates each hop's
//! `GapFill` requirements and prunes anything the destination version no
//! longer has a use for.

use align_core::entities::{AnchorPolicy, Scenario};
use align_core::ids::{ScenarioId, StepId, TenantId};
use align_core::stores::ConfigStore;
use align_core::{Error, Result};
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CompositeMigration {
    /// The step in the final (`to_version`) scenario the session should
    /// land on once every hop's remediation is satisfied.
    pub final_step_id: StepId,
    /// Fields to collect before teleporting, already pruned against the
    /// destination version's live field set (§8: "no obsolete fields
    /// requested").
    pub requested_fields: Vec<String>,
    /// Set when any intermediate hop required a `ReRoute`; the caller
    /// should fall back to a single-hop `RE_ROUTE` confirmation at that
    /// hop's checkpoint instead of silently teleporting the rest.
    pub re_route_checkpoint: Option<StepId>,
    pub warnings: Vec<String>,
}

pub struct CompositeMapper {
    config_store: Arc<dyn ConfigStore>,
}

impl CompositeMapper {
    pub fn new(config_store: Arc<dyn ConfigStore>) -> Self {
        Self { config_store }
    }

    /// Walk every `(v, v+1)` plan from `from_version` to `to_version`,
    /// following `starting_anchor_hash` through each hop, and compose
    /// the combined remediation (§4.9, §8 scenario 6).
    #[tracing::instrument(skip(self, final_scenario), fields(scenario_id = %scenario_id, from_version, to_version))]
    pub async fn compose(
        &self,
        tenant_id: TenantId,
        scenario_id: ScenarioId,
        from_version: u32,
        to_version: u32,
        starting_anchor_hash: &str,
        final_scenario: &Scenario,
    ) -> Result<CompositeMigration> {
        let mut accumulated: HashSet<String> = HashSet::new();
        let mut warnings = Vec::new();
        let mut re_route_checkpoint = None;
        let mut final_step_id = None;

        let mut v = from_version;
        while v < to_version {
            let next = v + 1;
            let plan = self
                .config_store
                .find_migration_plan(tenant_id, scenario_id, v, next)
                .await?
                .ok_or_else(|| Error::Migration(format!("no migration plan for {scenario_id} v{v}->v{next}")))?;

            let anchor = plan.transformation_map.anchor_for_hash(starting_anchor_hash).ok_or_else(|| {
                Error::Migration(format!(
                    "anchor {starting_anchor_hash} did not survive the v{v}->v{next} hop; a single-hop plan is required instead of composite"
                ))
            })?;

            match &anchor.policy {
                AnchorPolicy::CleanGraft => {}
                AnchorPolicy::GapFill { required_fields } => {
                    accumulated.extend(required_fields.iter().cloned());
                }
                AnchorPolicy::ReRoute { checkpoint_step_id } => {
                    warnings.push(format!("v{v}->v{next} hop requires re-route confirmation at {checkpoint_step_id}"));
                    re_route_checkpoint.get_or_insert(*checkpoint_step_id);
                }
            }

            final_step_id = Some(anchor.v2_step_id);
            v = next;
        }

        let final_step_id = final_step_id
            .ok_or_else(|| Error::invalid("composite migration requires from_version < to_version"))?;

        // required_n (§8): the full set of fields the destination
        // version's graph still asks for anywhere. Fields outside this
        // set were dropped by a later version and must not be requested
        // even if an earlier hop's anchor still named them.
        let required_n: HashSet<String> =
            final_scenario.steps.iter().flat_map(|s| s.required_fields.iter().cloned()).collect();

        let mut requested_fields: Vec<String> = accumulated.intersection(&required_n).cloned().collect();
        requested_fields.sort();

        Ok(CompositeMigration { final_step_id, requested_fields, re_route_checkpoint, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::entities::{
        AnchorMapping, MigrationPlan, MigrationPlanStatus, ScenarioStep, StepType, TransformationMap,
    };
    use align_core::ids::{AgentId, MigrationPlanId};
    use align_core::tenant::AgentScoped;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    struct FakeConfigStore {
        plans: Mutex<HashMap<(u32, u32), MigrationPlan>>,
    }

    #[async_trait]
    impl ConfigStore for FakeConfigStore {
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
            unimplemented!()
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
        async fn get_migration_plan(&self, _t: TenantId, _p: MigrationPlanId) -> Result<MigrationPlan> {
            unimplemented!()
        }
        async fn save_migration_plan(&self, _p: MigrationPlan) -> Result<()> {
            unimplemented!()
        }
        async fn find_migration_plan(
            &self,
            _t: TenantId,
            _s: ScenarioId,
            from_version: u32,
            to_version: u32,
        ) -> Result<Option<MigrationPlan>> {
            Ok(self.plans.lock().get(&(from_version, to_version)).cloned())
        }
    }

    fn plan(scenario_id: ScenarioId, from: u32, to: u32, anchors: Vec<AnchorMapping>) -> MigrationPlan {
        MigrationPlan {
            id: MigrationPlanId::new(),
            tenant_id: TenantId::new(),
            agent_id: AgentId::new(),
            scenario_id,
            from_version: from,
            to_version: to,
            transformation_map: TransformationMap { anchors },
            scope_filter: None,
            warnings: vec![],
            summary: String::new(),
            status: MigrationPlanStatus::Deployed,
            created_at: Utc::now(),
        }
    }

    fn step(id: StepId, required_fields: Vec<&str>) -> ScenarioStep {
        ScenarioStep {
            id,
            step_type: StepType::Interaction,
            description: None,
            local_rule_ids: vec![],
            required_fields: required_fields.into_iter().map(String::from).collect(),
            transitions: vec![],
        }
    }

    #[tokio::test]
    async fn accumulates_and_prunes_across_three_hops() {
        let scenario_id = ScenarioId::new();
        let anchor_hash = "abc123".to_string();
        let v1_step = StepId::new();
        let v2_step = StepId::new();
        let v3_step = StepId::new();
        let v4_step = StepId::new();

        let mut plans = HashMap::new();
        plans.insert(
            (1, 2),
            plan(
                scenario_id,
                1,
                2,
                vec![AnchorMapping {
                    v1_step_id: v1_step,
                    v2_step_id: v2_step,
                    anchor_hash: anchor_hash.clone(),
                    policy: AnchorPolicy::GapFill { required_fields: vec!["passport_number".into()] },
                }],
            ),
        );
        plans.insert(
            (2, 3),
            plan(
                scenario_id,
                2,
                3,
                vec![AnchorMapping {
                    v1_step_id: v2_step,
                    v2_step_id: v3_step,
                    anchor_hash: anchor_hash.clone(),
                    policy: AnchorPolicy::GapFill { required_fields: vec!["date_of_birth".into()] },
                }],
            ),
        );
        plans.insert(
            (3, 4),
            plan(
                scenario_id,
                3,
                4,
                vec![AnchorMapping {
                    v1_step_id: v3_step,
                    v2_step_id: v4_step,
                    anchor_hash: anchor_hash.clone(),
                    policy: AnchorPolicy::CleanGraft,
                }],
            ),
        );

        let store = Arc::new(FakeConfigStore { plans: Mutex::new(plans) });
        let mapper = CompositeMapper::new(store);

        let final_scenario = Scenario {
            header: AgentScoped::new(TenantId::new(), AgentId::new()),
            id: scenario_id,
            version: 4,
            entry_step_id: v4_step,
            entry_examples: vec![],
            entry_example_embeddings: vec![],
            intent_label: None,
            steps: vec![step(v4_step, vec!["date_of_birth"])],
        };

        let result = mapper
            .compose(TenantId::new(), scenario_id, 1, 4, &anchor_hash, &final_scenario)
            .await
            .unwrap();

        assert_eq!(result.final_step_id, v4_step);
        assert_eq!(result.requested_fields, vec!["date_of_birth".to_string()]);
        assert!(result.re_route_checkpoint.is_none());
    }
}

//! `MigrationPlanner` (§4.9): turns two scenario versions into a
//! reviewable `MigrationPlan`.

use super::diff::find_anchors;
use align_core::entities::{AnchorPolicy, MigrationPlan, MigrationPlanStatus, Scenario, TransformationMap};
use align_core::ids::{AgentId, MigrationPlanId, TenantId};
use chrono::Utc;

pub struct MigrationPlanner;

impl MigrationPlanner {
    /// Diff `v1` against `v2` (same `scenario_id`, `v2.version > v1.version`)
    /// and produce a `Pending` plan for operator review.
    pub fn plan(tenant_id: TenantId, agent_id: AgentId, v1: &Scenario, v2: &Scenario) -> MigrationPlan {
        let anchors = find_anchors(v1, v2);

        let mut warnings = Vec::new();
        if anchors.is_empty() {
            warnings.push("no anchors found between versions; affected sessions have no safe migration path".to_string());
        }
        let re_routes = anchors.iter().filter(|a| matches!(a.policy, AnchorPolicy::ReRoute { .. })).count();
        if re_routes > 0 {
            warnings.push(format!("{re_routes} anchor(s) require customer re-route confirmation"));
        }

        let summary = format!(
            "{} anchor(s): {} clean graft, {} gap fill, {} re-route",
            anchors.len(),
            anchors.iter().filter(|a| matches!(a.policy, AnchorPolicy::CleanGraft)).count(),
            anchors.iter().filter(|a| matches!(a.policy, AnchorPolicy::GapFill { .. })).count(),
            re_routes,
        );

        MigrationPlan {
            id: MigrationPlanId::new(),
            tenant_id,
            agent_id,
            scenario_id: v2.id,
            from_version: v1.version,
            to_version: v2.version,
            transformation_map: TransformationMap { anchors },
            scope_filter: None,
            warnings,
            summary,
            status: MigrationPlanStatus::Pending,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::entities::{ScenarioStep, StepType};
    use align_core::ids::{ScenarioId, StepId};
    use align_core::tenant::AgentScoped;

    fn scenario(entry: StepId, version: u32, steps: Vec<ScenarioStep>) -> Scenario {
        Scenario {
            header: AgentScoped::new(TenantId::new(), AgentId::new()),
            id: ScenarioId::new(),
            version,
            entry_step_id: entry,
            entry_examples: vec![],
            entry_example_embeddings: vec![],
            intent_label: None,
            steps,
        }
    }

    #[test]
    fn identical_versions_produce_all_clean_graft_plan() {
        let a = StepId::new();
        let steps = vec![ScenarioStep {
            id: a,
            step_type: StepType::Interaction,
            description: Some("greet".into()),
            local_rule_ids: vec![],
            required_fields: vec![],
            transitions: vec![],
        }];
        let v1 = scenario(a, 1, steps.clone());
        let v2 = scenario(a, 2, steps);
        let tenant = TenantId::new();
        let agent = AgentId::new();

        let plan = MigrationPlanner::plan(tenant, agent, &v1, &v2);
        assert_eq!(plan.status, MigrationPlanStatus::Pending);
        assert_eq!(plan.transformation_map.anchors.len(), 1);
        assert!(plan.warnings.iter().all(|w| !w.contains("re-route")));
    }
}

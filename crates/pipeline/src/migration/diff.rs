//! Anchor detection (§4.9): steps whose content is unchanged across two
//! scenario versions, plus the upstream/downstream classification that
//! decides each anchor's migration policy.

use super::hashing::content_hash;
use align_core::entities::{AnchorMapping, AnchorPolicy, Scenario};
use align_core::ids::StepId;
use std::collections::{HashMap, HashSet};

/// Steps reachable from `from` by walking predecessor edges, i.e. every
/// step that can reach `from` going forward. Mirrors
/// `Scenario::reachable_from` but against `predecessors` instead of
/// `transitions`.
fn upstream_closure(scenario: &Scenario, from: StepId) -> HashSet<StepId> {
    let mut visited = HashSet::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(from);
    visited.insert(from);
    while let Some(current) = queue.pop_front() {
        for pred in scenario.predecessors(current) {
            if visited.insert(pred) {
                queue.push_back(pred);
            }
        }
    }
    visited.remove(&from);
    visited
}

fn downstream_closure(scenario: &Scenario, from: StepId) -> HashSet<StepId> {
    let mut set = scenario.reachable_from(from);
    set.remove(&from);
    set
}

fn required_fields_of(scenario: &Scenario, steps: &HashSet<StepId>) -> HashSet<String> {
    scenario
        .steps
        .iter()
        .filter(|s| steps.contains(&s.id))
        .flat_map(|s| s.required_fields.iter().cloned())
        .collect()
}

/// `(v1_hash -> v1_step_id)` / `(v2_hash -> v2_step_id)` anchors: steps
/// whose `content_hash` is unchanged between versions.
pub fn find_anchors(v1: &Scenario, v2: &Scenario) -> Vec<AnchorMapping> {
    let v1_hashes: HashMap<String, StepId> = v1.steps.iter().map(|s| (content_hash(s), s.id)).collect();
    let v2_hashes: HashMap<String, StepId> = v2.steps.iter().map(|s| (content_hash(s), s.id)).collect();

    let mut anchors = Vec::new();
    for (hash, &v1_step_id) in &v1_hashes {
        let Some(&v2_step_id) = v2_hashes.get(hash) else { continue };
        let policy = classify_anchor(v1, v1_step_id, v2, v2_step_id);
        anchors.push(AnchorMapping { v1_step_id, v2_step_id, anchor_hash: hash.clone(), policy });
    }
    anchors.sort_by_key(|a| a.anchor_hash.clone());
    anchors
}

/// Decide the remediation an anchor needs by comparing its upstream
/// neighborhood across versions (§4.9). Downstream changes never require
/// remediation: a session already past the anchor has no further
/// dependency on what follows.
fn classify_anchor(v1: &Scenario, v1_anchor: StepId, v2: &Scenario, v2_anchor: StepId) -> AnchorPolicy {
    let v1_upstream = upstream_closure(v1, v1_anchor);
    let v2_upstream = upstream_closure(v2, v2_anchor);

    let v1_upstream_hashes: HashSet<String> = v1.steps.iter().filter(|s| v1_upstream.contains(&s.id)).map(content_hash).collect();
    let v2_upstream_hashes: HashSet<String> = v2.steps.iter().filter(|s| v2_upstream.contains(&s.id)).map(content_hash).collect();

    if v1_upstream_hashes == v2_upstream_hashes {
        return AnchorPolicy::CleanGraft;
    }

    let v1_fields = required_fields_of(v1, &v1_upstream);
    let v2_fields = required_fields_of(v2, &v2_upstream);
    let new_fields: Vec<String> = v2_fields.difference(&v1_fields).cloned().collect();
    if !new_fields.is_empty() {
        let mut new_fields = new_fields;
        new_fields.sort();
        return AnchorPolicy::GapFill { required_fields: new_fields };
    }

    // Upstream neighborhoods differ in structure but not in the fields
    // they collect: branching changed. Ask the customer to confirm at
    // the anchor itself, since that is the first point both versions
    // agree on.
    AnchorPolicy::ReRoute { checkpoint_step_id: v2_anchor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::entities::{ScenarioStep, StepTransition, StepType};
    use align_core::ids::{AgentId, TenantId};
    use align_core::tenant::AgentScoped;

    fn step(id: StepId, description: &str, required_fields: Vec<&str>, transitions: Vec<StepTransition>) -> ScenarioStep {
        ScenarioStep {
            id,
            step_type: StepType::Interaction,
            description: Some(description.into()),
            local_rule_ids: vec![],
            required_fields: required_fields.into_iter().map(String::from).collect(),
            transitions,
        }
    }

    fn transition(target: StepId) -> StepTransition {
        StepTransition { target_step_id: target, condition: None, intent_match: None, llm_adjudication_hint: None }
    }

    fn scenario(entry: StepId, version: u32, steps: Vec<ScenarioStep>) -> Scenario {
        Scenario {
            header: AgentScoped::new(TenantId::new(), AgentId::new()),
            id: align_core::ids::ScenarioId::new(),
            version,
            entry_step_id: entry,
            entry_examples: vec![],
            entry_example_embeddings: vec![],
            intent_label: None,
            steps,
        }
    }

    #[test]
    fn unchanged_scenario_yields_clean_graft_anchors() {
        let a = StepId::new();
        let b = StepId::new();
        let steps = vec![step(a, "collect name", vec!["name"], vec![transition(b)]), step(b, "confirm", vec![], vec![])];
        let v1 = scenario(a, 1, steps.clone());
        let v2 = scenario(a, 2, steps);

        let anchors = find_anchors(&v1, &v2);
        assert_eq!(anchors.len(), 2);
        assert!(anchors.iter().all(|a| matches!(a.policy, AnchorPolicy::CleanGraft)));
    }

    #[test]
    fn new_upstream_required_field_triggers_gap_fill() {
        let a = StepId::new();
        let b = StepId::new();
        let v1_steps = vec![step(a, "collect name", vec!["name"], vec![transition(b)]), step(b, "confirm", vec![], vec![])];
        let mut v2_steps = v1_steps.clone();
        v2_steps[0].required_fields.push("phone".into());
        let v1 = scenario(a, 1, v1_steps);
        let v2 = scenario(a, 2, v2_steps);

        let anchors = find_anchors(&v1, &v2);
        let b_anchor = anchors.iter().find(|an| an.v1_step_id == b).unwrap();
        match &b_anchor.policy {
            AnchorPolicy::GapFill { required_fields } => assert_eq!(required_fields, &vec!["phone".to_string()]),
            other => panic!("expected GapFill, got {other:?}"),
        }
    }
}

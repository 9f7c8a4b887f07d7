//! Scenario graph entities (§3) and graph validation.

use crate::ids::{RuleId, ScenarioId, StepId};
use crate::tenant::AgentScoped;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Action,
    Interaction,
    Logic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTransition {
    pub target_step_id: StepId,
    /// Deterministic condition expression (see `core::expr`), evaluated
    /// against the merged profile/session/entity environment.
    pub condition: Option<String>,
    pub intent_match: Option<String>,
    pub llm_adjudication_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub id: StepId,
    pub step_type: StepType,
    pub description: Option<String>,
    pub local_rule_ids: Vec<RuleId>,
    pub required_fields: Vec<String>,
    /// Authoring order is preserved; used for deterministic tie-breaks
    /// among transitions scoring equally.
    pub transitions: Vec<StepTransition>,
}

impl ScenarioStep {
    pub fn is_terminal(&self) -> bool {
        self.transitions.is_empty()
    }

    /// `content_hash` canonical input (see `core::migration`): type,
    /// description, sorted required fields, and transitions ordered by
    /// semantic content rather than authoring order.
    pub fn canonical_for_hash(&self) -> serde_json::Value {
        let mut required_fields = self.required_fields.clone();
        required_fields.sort();

        let mut transitions: Vec<serde_json::Value> = self
            .transitions
            .iter()
            .map(|t| {
                serde_json::json!({
                    "target": t.target_step_id.to_string(),
                    "condition": t.condition,
                    "intent_match": t.intent_match,
                })
            })
            .collect();
        transitions.sort_by(|a, b| a.to_string().cmp(&b.to_string()));

        serde_json::json!({
            "step_type": self.step_type,
            "description": self.description,
            "required_fields": required_fields,
            "transitions": transitions,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(flatten)]
    pub header: AgentScoped,
    pub id: ScenarioId,
    pub version: u32,
    pub entry_step_id: StepId,
    pub entry_examples: Vec<String>,
    /// Precomputed embeddings of `entry_examples` (+ entry condition),
    /// aligned 1:1 with `entry_examples` by index.
    pub entry_example_embeddings: Vec<Vec<f32>>,
    pub intent_label: Option<String>,
    pub steps: Vec<ScenarioStep>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    MissingEntry,
    DanglingTransition { from: StepId, to: StepId },
    UnreachableStep(StepId),
    NoTerminalStep,
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphError::MissingEntry => write!(f, "entry_step_id does not reference an existing step"),
            GraphError::DanglingTransition { from, to } => {
                write!(f, "transition from {from} targets nonexistent step {to}")
            }
            GraphError::UnreachableStep(id) => write!(f, "step {id} is unreachable from entry"),
            GraphError::NoTerminalStep => write!(f, "scenario has no terminal step"),
        }
    }
}

impl Scenario {
    pub fn step(&self, id: StepId) -> Option<&ScenarioStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Validate graph invariants from §3: entry exists, every transition
    /// target exists, every step reachable from entry, at least one
    /// terminal step. Deterministic: calling this twice on the same
    /// scenario yields the same error set (§8).
    pub fn validate(&self) -> Vec<GraphError> {
        let mut errors = Vec::new();
        let ids: HashSet<StepId> = self.steps.iter().map(|s| s.id).collect();

        if !ids.contains(&self.entry_step_id) {
            errors.push(GraphError::MissingEntry);
        }

        for step in &self.steps {
            for t in &step.transitions {
                if !ids.contains(&t.target_step_id) {
                    errors.push(GraphError::DanglingTransition {
                        from: step.id,
                        to: t.target_step_id,
                    });
                }
            }
        }

        if ids.contains(&self.entry_step_id) {
            let reachable = self.reachable_from(self.entry_step_id);
            let mut unreachable: Vec<StepId> = self
                .steps
                .iter()
                .map(|s| s.id)
                .filter(|id| !reachable.contains(id))
                .collect();
            unreachable.sort_by_key(|id| id.to_string());
            for id in unreachable {
                errors.push(GraphError::UnreachableStep(id));
            }
        }

        if !self.steps.iter().any(|s| s.is_terminal()) {
            errors.push(GraphError::NoTerminalStep);
        }

        errors
    }

    /// Breadth-first reachability from `from`, used by both validation
    /// and the migration subsystem's anchor diffing.
    pub fn reachable_from(&self, from: StepId) -> HashSet<StepId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(from);
        visited.insert(from);
        while let Some(current) = queue.pop_front() {
            if let Some(step) = self.step(current) {
                for t in &step.transitions {
                    if visited.insert(t.target_step_id) {
                        queue.push_back(t.target_step_id);
                    }
                }
            }
        }
        visited
    }

    /// Steps with an incoming transition from `target` (used by the
    /// migration subsystem's reverse BFS for upstream change detection).
    pub fn predecessors(&self, target: StepId) -> Vec<StepId> {
        self.steps
            .iter()
            .filter(|s| s.transitions.iter().any(|t| t.target_step_id == target))
            .map(|s| s.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{AgentId, TenantId};

    fn step(id: StepId, transitions: Vec<StepTransition>) -> ScenarioStep {
        ScenarioStep {
            id,
            step_type: StepType::Interaction,
            description: None,
            local_rule_ids: vec![],
            required_fields: vec![],
            transitions,
        }
    }

    fn transition(target: StepId) -> StepTransition {
        StepTransition {
            target_step_id: target,
            condition: None,
            intent_match: None,
            llm_adjudication_hint: None,
        }
    }

    fn scenario(entry: StepId, steps: Vec<ScenarioStep>) -> Scenario {
        Scenario {
            header: AgentScoped::new(TenantId::new(), AgentId::new()),
            id: ScenarioId::new(),
            version: 1,
            entry_step_id: entry,
            entry_examples: vec![],
            entry_example_embeddings: vec![],
            intent_label: None,
            steps,
        }
    }

    #[test]
    fn valid_graph_has_no_errors() {
        let a = StepId::new();
        let b = StepId::new();
        let s = scenario(a, vec![step(a, vec![transition(b)]), step(b, vec![])]);
        assert!(s.validate().is_empty());
    }

    #[test]
    fn dangling_transition_is_detected() {
        let a = StepId::new();
        let ghost = StepId::new();
        let s = scenario(a, vec![step(a, vec![transition(ghost)])]);
        assert!(s.validate().contains(&GraphError::DanglingTransition { from: a, to: ghost }));
    }

    #[test]
    fn unreachable_step_is_detected() {
        let a = StepId::new();
        let b = StepId::new();
        let orphan = StepId::new();
        let s = scenario(a, vec![step(a, vec![transition(b)]), step(b, vec![]), step(orphan, vec![])]);
        assert!(s.validate().contains(&GraphError::UnreachableStep(orphan)));
    }

    #[test]
    fn no_terminal_step_is_detected() {
        let a = StepId::new();
        let s = scenario(a, vec![step(a, vec![transition(a)])]);
        assert!(s.validate().contains(&GraphError::NoTerminalStep));
    }

    #[test]
    fn validation_is_idempotent() {
        let a = StepId::new();
        let ghost = StepId::new();
        let s = scenario(a, vec![step(a, vec![transition(ghost)])]);
        assert_eq!(s.validate(), s.validate());
    }
}

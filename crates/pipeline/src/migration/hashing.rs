//! Content hashing (§4.9): stable identity for a step's semantic content,
//! independent of authoring order, used to detect anchors across a
//! scenario's versions.

use align_core::entities::{Scenario, ScenarioStep};
use sha2::{Digest, Sha256};

/// First 16 hex characters of `SHA256(canonical JSON of the step)`.
pub fn content_hash(step: &ScenarioStep) -> String {
    let canonical = step.canonical_for_hash();
    let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    hex_prefix(&digest, 16)
}

/// Hash over every step's `content_hash`, ordered by step id so the
/// checksum does not depend on authoring order.
pub fn scenario_checksum(scenario: &Scenario) -> String {
    let mut hashes: Vec<String> = scenario.steps.iter().map(content_hash).collect();
    hashes.sort();
    let joined = hashes.join(",");
    let digest = Sha256::digest(joined.as_bytes());
    hex_prefix(&digest, 16)
}

fn hex_prefix(digest: &[u8], hex_chars: usize) -> String {
    let bytes_needed = hex_chars.div_ceil(2);
    digest.iter().take(bytes_needed).map(|b| format!("{b:02x}")).collect::<String>()[..hex_chars].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::entities::{StepTransition, StepType};
    use align_core::ids::StepId;

    fn step(id: StepId, required_fields: Vec<&str>) -> ScenarioStep {
        ScenarioStep {
            id,
            step_type: StepType::Interaction,
            description: Some("ask for amount".into()),
            local_rule_ids: vec![],
            required_fields: required_fields.into_iter().map(String::from).collect(),
            transitions: vec![StepTransition { target_step_id: id, condition: None, intent_match: None, llm_adjudication_hint: None }],
        }
    }

    #[test]
    fn hash_is_stable_across_required_field_reordering() {
        let a = step(StepId::new(), vec!["amount", "tier"]);
        let mut b = a.clone();
        b.required_fields = vec!["tier".into(), "amount".into()];
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn hash_changes_with_description() {
        let id = StepId::new();
        let a = step(id, vec!["amount"]);
        let mut b = a.clone();
        b.description = Some("ask for a different thing".into());
        assert_ne!(content_hash(&a), content_hash(&b));
    }
}

//! `GapFillService` (§4.9): tiered resolution of a `GAP_FILL` anchor's
//! newly required fields — profile, then session variables, then
//! LLM extraction from the conversation, gated by confidence thresholds.

use align_config::GapFillConfig;
use align_core::entities::{CustomerProfile, FieldSource};
use align_core::ids::TenantId;
use align_core::providers::{ChatMessage, LlmProvider};
use align_core::stores::ProfileStore;
use align_core::variable::{VarMap, VarValue};
use align_core::Result;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct FieldResolution {
    pub name: String,
    pub value: Option<VarValue>,
    pub resolved: bool,
}

#[derive(Debug, Deserialize)]
struct ExtractedField {
    value: Option<String>,
    confidence: f32,
}

pub struct GapFillService {
    profile_store: Arc<dyn ProfileStore>,
    llm: Arc<dyn LlmProvider>,
    config: GapFillConfig,
}

impl GapFillService {
    pub fn new(profile_store: Arc<dyn ProfileStore>, llm: Arc<dyn LlmProvider>, config: GapFillConfig) -> Self {
        Self { profile_store, llm, config }
    }

    /// Resolve each of `fields` in tiered order. Resolutions above
    /// `no_confirm_threshold` are persisted back to the profile; ones
    /// only above `use_threshold` are used for this turn but not saved.
    #[tracing::instrument(skip(self, profile, session_variables, recent_message), fields(fields = fields.len()))]
    pub async fn resolve(
        &self,
        tenant_id: TenantId,
        profile: &CustomerProfile,
        session_variables: &VarMap,
        recent_message: &str,
        fields: &[String],
    ) -> Result<Vec<FieldResolution>> {
        let mut resolutions = Vec::new();
        for name in fields {
            if let Some(value) = profile.field_value(name) {
                resolutions.push(FieldResolution { name: name.clone(), value: Some(value.clone()), resolved: true });
                continue;
            }
            if let Some(value) = session_variables.get(name) {
                resolutions.push(FieldResolution { name: name.clone(), value: Some(value.clone()), resolved: true });
                continue;
            }

            match self.extract(recent_message, name).await? {
                Some((value, confidence)) if confidence >= self.config.no_confirm_threshold => {
                    self.profile_store
                        .update_field(tenant_id, profile.id, name, value.clone(), confidence, FieldSource::Inference)
                        .await?;
                    resolutions.push(FieldResolution { name: name.clone(), value: Some(value), resolved: true });
                }
                Some((value, confidence)) if confidence >= self.config.use_threshold => {
                    resolutions.push(FieldResolution { name: name.clone(), value: Some(value), resolved: true });
                }
                _ => resolutions.push(FieldResolution { name: name.clone(), value: None, resolved: false }),
            }
        }
        Ok(resolutions)
    }

    /// Unresolved field names after tiered resolution — these are the
    /// ones the orchestrator still needs to ask the customer about.
    pub fn unresolved(resolutions: &[FieldResolution]) -> Vec<String> {
        resolutions.iter().filter(|r| !r.resolved).map(|r| r.name.clone()).collect()
    }

    async fn extract(&self, recent_message: &str, field_name: &str) -> Result<Option<(VarValue, f32)>> {
        let prompt = format!(
            "Message: {recent_message}\nDoes it state the value of \"{field_name}\"? Reply with exactly one JSON object: {{\"value\": <string or null>, \"confidence\": <0.0-1.0>}}."
        );
        let messages = vec![ChatMessage::system(EXTRACTION_SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let response = self.llm.generate(&messages, None, 100, 0.0, None).await?;
        let Ok(parsed) = serde_json::from_str::<ExtractedField>(response.text.trim()) else { return Ok(None) };
        Ok(parsed.value.map(|v| (VarValue::from(v), parsed.confidence)))
    }
}

const EXTRACTION_SYSTEM_PROMPT: &str = "Extract a single field's value from the message, or null if absent. Reply with exactly one JSON object.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_filters_by_resolved_flag() {
        let resolutions = vec![
            FieldResolution { name: "a".into(), value: Some(VarValue::from("x")), resolved: true },
            FieldResolution { name: "b".into(), value: None, resolved: false },
        ];
        assert_eq!(GapFillService::unresolved(&resolutions), vec!["b".to_string()]);
    }
}

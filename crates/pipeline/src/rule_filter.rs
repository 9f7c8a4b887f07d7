//! Rule Filter (§4.5): a probabilistic judge decides, per batch, which
//! retrieved rule candidates actually apply to the current turn.
//!
//! Biased toward false negatives: an unmatched GLOBAL hard constraint is
//! still evaluated by the enforcer (§4.10), so under-matching here is
//! recoverable while over-matching would pollute the generation prompt.

use crate::context::{Context, ScenarioSignal};
use crate::retrieval::RuleCandidate;
use align_config::RuleFilterConfig;
use align_core::ids::RuleId;
use align_core::providers::{ChatMessage, LlmProvider};
use align_core::{Error, Result};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct MatchedRule {
    pub rule_id: RuleId,
    pub confidence: f32,
    pub reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawMatch {
    rule_id: String,
    applies: bool,
    confidence: f32,
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct RawBatchResponse {
    matches: Vec<RawMatch>,
    #[serde(default)]
    scenario_signal: Option<ScenarioSignal>,
}

pub struct RuleFilter {
    llm: Arc<dyn LlmProvider>,
    config: RuleFilterConfig,
}

impl RuleFilter {
    pub fn new(llm: Arc<dyn LlmProvider>, config: RuleFilterConfig) -> Self {
        Self { llm, config }
    }

    #[tracing::instrument(skip(self, message, context, candidates), fields(candidates = candidates.len()))]
    pub async fn filter(
        &self,
        message: &str,
        context: &Context,
        candidates: &[RuleCandidate],
    ) -> Result<(Vec<MatchedRule>, Option<ScenarioSignal>)> {
        if !self.config.enabled || candidates.is_empty() {
            return Ok((Vec::new(), None));
        }

        let mut matched = Vec::new();
        let mut scenario_signal = None;

        for batch in candidates.chunks(self.config.batch_size.max(1)) {
            let (batch_matched, signal) = self.filter_batch(message, context, batch).await?;
            matched.extend(batch_matched);
            if scenario_signal.is_none() {
                scenario_signal = signal;
            }
        }

        matched.retain(|m: &MatchedRule| m.confidence >= self.config.relevance_threshold);
        matched.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
        matched.truncate(self.config.max_rules);

        Ok((matched, scenario_signal))
    }

    async fn filter_batch(
        &self,
        message: &str,
        context: &Context,
        batch: &[RuleCandidate],
    ) -> Result<(Vec<MatchedRule>, Option<ScenarioSignal>)> {
        let rules_json: Vec<serde_json::Value> = batch
            .iter()
            .map(|c| {
                serde_json::json!({
                    "rule_id": c.rule.id.to_string(),
                    "condition": c.rule.condition_text,
                    "action": c.rule.action_text,
                })
            })
            .collect();

        let prompt = format!(
            "{}\n\nUser message: {}\nExtracted intent: {:?}\nCandidate rules:\n{}",
            RULE_FILTER_SYSTEM_PROMPT,
            message,
            context.intent_label,
            serde_json::to_string(&rules_json).unwrap_or_default(),
        );

        let messages = vec![ChatMessage::system(RULE_FILTER_SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let response = self.llm.generate(&messages, Some(&self.config.model), 600, 0.0, None).await?;

        let raw: RawBatchResponse = serde_json::from_str(response.text.trim())
            .map_err(|e| Error::internal(format!("rule filter returned non-JSON: {e}")))?;

        let matched = raw
            .matches
            .into_iter()
            .filter(|m| m.applies)
            .filter_map(|m| {
                m.rule_id.parse::<align_core::ids::RuleId>().ok().map(|rule_id| MatchedRule {
                    rule_id,
                    confidence: m.confidence,
                    reasoning: m.reasoning,
                })
            })
            .collect();

        Ok((matched, raw.scenario_signal))
    }
}

const RULE_FILTER_SYSTEM_PROMPT: &str = r#"You judge whether candidate rules apply to the current customer message. For each candidate, decide if it applies. Favor saying a rule does NOT apply when unsure (false negatives are recoverable; false positives are not). Reply with exactly one JSON object: {"matches": [{"rule_id": string, "applies": boolean, "confidence": number 0-1, "reasoning": string}], "scenario_signal": "start"|"exit"|null}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_batch_response_parses() {
        let json = r#"{"matches":[{"rule_id":"r1","applies":true,"confidence":0.9,"reasoning":"matches refund intent"}],"scenario_signal":"start"}"#;
        let raw: RawBatchResponse = serde_json::from_str(json).unwrap();
        assert_eq!(raw.matches.len(), 1);
        assert_eq!(raw.scenario_signal, Some(ScenarioSignal::Start));
    }
}

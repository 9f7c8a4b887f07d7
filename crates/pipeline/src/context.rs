//! Context Extractor (§4.2): produces an enriched [`Context`] from the
//! raw inbound message plus recent turn history.

use align_config::{ContextExtractionConfig, ContextExtractionMode};
use align_core::providers::{ChatMessage, EmbeddingProvider, LlmProvider};
use align_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioSignal {
    Start,
    Continue,
    Exit,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub name: String,
    pub value: String,
}

/// Enriched structured understanding of a user message (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    pub intent_label: Option<String>,
    pub confidence: f32,
    pub entities: Vec<ExtractedEntity>,
    pub sentiment: Option<String>,
    pub urgency: Option<String>,
    pub scenario_signal: ScenarioSignal,
    pub is_ambiguous: bool,
    pub ambiguity_reason: Option<String>,
    /// Always carries a vector of the configured embedding provider's
    /// fixed dimension (§4.2 contract), regardless of extraction mode.
    pub embedding: Vec<f32>,
}

impl Context {
    pub fn entity(&self, name: &str) -> Option<&str> {
        self.entities.iter().find(|e| e.name == name).map(|e| e.value.as_str())
    }
}

/// Raw shape the LLM is asked to reply with in `Full` mode; parsed then
/// lifted into [`Context`] (embedding filled in separately since the
/// generation model and embedding model are not required to be the
/// same call).
#[derive(Debug, Deserialize)]
struct RawExtraction {
    intent_label: Option<String>,
    confidence: f32,
    entities: Vec<ExtractedEntity>,
    sentiment: Option<String>,
    urgency: Option<String>,
    scenario_signal: ScenarioSignal,
    is_ambiguous: bool,
    ambiguity_reason: Option<String>,
}

pub struct ContextExtractor {
    config: ContextExtractionConfig,
    llm: Arc<dyn LlmProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl ContextExtractor {
    pub fn new(
        config: ContextExtractionConfig,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self { config, llm, embedder }
    }

    #[tracing::instrument(skip(self, history), fields(mode = ?self.config.mode))]
    pub async fn extract(&self, message: &str, history: &[ChatMessage]) -> Result<Context> {
        match self.config.mode {
            ContextExtractionMode::Disabled => Ok(Context {
                intent_label: None,
                confidence: 1.0,
                entities: Vec::new(),
                sentiment: None,
                urgency: None,
                scenario_signal: ScenarioSignal::Unknown,
                is_ambiguous: false,
                ambiguity_reason: None,
                embedding: self.embedder.embed_one(message, None).await?,
            }),
            ContextExtractionMode::EmbeddingOnly => Ok(Context {
                intent_label: Some(message.to_string()),
                confidence: 1.0,
                entities: Vec::new(),
                sentiment: None,
                urgency: None,
                scenario_signal: ScenarioSignal::Unknown,
                is_ambiguous: false,
                ambiguity_reason: None,
                embedding: self.embedder.embed_one(message, None).await?,
            }),
            ContextExtractionMode::Llm => self.extract_full(message, history).await,
        }
    }

    async fn extract_full(&self, message: &str, history: &[ChatMessage]) -> Result<Context> {
        let trimmed_history: Vec<&ChatMessage> = history
            .iter()
            .rev()
            .take(self.config.history_turns as usize)
            .collect();

        let mut messages = vec![ChatMessage::system(EXTRACTION_SYSTEM_PROMPT)];
        messages.extend(trimmed_history.into_iter().rev().cloned());
        messages.push(ChatMessage::user(message));

        let (embedding, response) = tokio::try_join!(
            self.embedder.embed_one(message, None),
            self.llm.generate(&messages, Some(&self.config.model), 400, 0.0, None),
        )?;

        let raw: RawExtraction = serde_json::from_str(response.text.trim())
            .map_err(|e| Error::internal(format!("context extraction returned non-JSON: {e}")))?;

        Ok(Context {
            intent_label: raw.intent_label,
            confidence: raw.confidence,
            entities: raw.entities,
            sentiment: raw.sentiment,
            urgency: raw.urgency,
            scenario_signal: raw.scenario_signal,
            is_ambiguous: raw.is_ambiguous,
            ambiguity_reason: raw.ambiguity_reason,
            embedding,
        })
    }
}

const EXTRACTION_SYSTEM_PROMPT: &str = r#"You extract structured context from a customer message. Reply with exactly one JSON object matching this shape, nothing else:
{"intent_label": string|null, "confidence": number 0-1, "entities": [{"name": string, "value": string}], "sentiment": string|null, "urgency": string|null, "scenario_signal": "start"|"continue"|"exit"|"unknown", "is_ambiguous": boolean, "ambiguity_reason": string|null}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_extraction_parses_minimal_shape() {
        let json = r#"{"intent_label":"refund","confidence":0.8,"entities":[],"sentiment":null,"urgency":null,"scenario_signal":"start","is_ambiguous":false,"ambiguity_reason":null}"#;
        let raw: RawExtraction = serde_json::from_str(json).unwrap();
        assert_eq!(raw.intent_label.as_deref(), Some("refund"));
        assert_eq!(raw.scenario_signal, ScenarioSignal::Start);
    }
}

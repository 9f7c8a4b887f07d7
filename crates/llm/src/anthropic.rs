//! Anthropic Messages API client implementing `LlmProvider`.

use align_core::providers::llm::{ChatMessage, ChatRole, GenerationResponse, TextChunk};
use align_core::providers::LlmProvider;
use align_core::{Error, Result};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Anthropic model identifiers this provider has been exercised against.
/// `model` on every call can still pass an arbitrary string through, this
/// enum only exists to give callers a typo-proof default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnthropicModel {
    Opus,
    Sonnet,
    Haiku,
}

impl AnthropicModel {
    pub fn model_id(&self) -> &'static str {
        match self {
            AnthropicModel::Opus => "claude-opus-4-5-20251101",
            AnthropicModel::Sonnet => "claude-sonnet-4-20250514",
            AnthropicModel::Haiku => "claude-3-5-haiku-20241022",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicConfig {
    pub api_key: String,
    pub default_model: AnthropicModel,
    pub endpoint: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self { api_key: api_key.into(), default_model: AnthropicModel::Sonnet, endpoint: "https://api.anthropic.com".to_string(), timeout: Duration::from_secs(60) }
    }

    pub fn with_default_model(mut self, model: AnthropicModel) -> Self {
        self.default_model = model;
        self
    }
}

pub struct AnthropicProvider {
    config: AnthropicConfig,
    client: Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::LlmUnavailable("ANTHROPIC_API_KEY not set".to_string()));
        }
        let client = Client::builder().timeout(config.timeout).build().map_err(|e| Error::internal(format!("building anthropic http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn split_system(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
        let system = messages.iter().find(|m| m.role == ChatRole::System).map(|m| m.content.clone());
        let rest = messages
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .map(|m| AnthropicMessage { role: role_name(m.role), content: m.content.clone() })
            .collect();
        (system, rest)
    }
}

fn role_name(role: ChatRole) -> String {
    match role {
        ChatRole::System => unreachable!("system messages are split out before conversion"),
        ChatRole::User => "user".to_string(),
        ChatRole::Assistant => "assistant".to_string(),
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: StreamDelta },
    MessageDelta { usage: Option<AnthropicUsage> },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn generate(&self, messages: &[ChatMessage], model: Option<&str>, max_tokens: u32, temperature: f32, stop: Option<&[String]>) -> Result<GenerationResponse> {
        let (system, anthropic_messages) = Self::split_system(messages);
        let request = AnthropicRequest {
            model: model.unwrap_or(self.config.default_model.model_id()).to_string(),
            max_tokens,
            messages: anthropic_messages,
            system,
            temperature,
            stop_sequences: stop.map(|s| s.to_vec()),
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::LlmUnavailable(format!("anthropic request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LlmUnavailable(format!("anthropic returned {status}: {body}")));
        }

        let parsed: AnthropicResponse = response.json().await.map_err(|e| Error::LlmUnavailable(format!("decoding anthropic response: {e}")))?;
        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(GenerationResponse { text, tokens: parsed.usage.output_tokens })
    }

    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        stop: Option<&[String]>,
    ) -> Result<BoxStream<'static, Result<TextChunk>>> {
        let (system, anthropic_messages) = Self::split_system(messages);
        let request = AnthropicRequest {
            model: model.unwrap_or(self.config.default_model.model_id()).to_string(),
            max_tokens,
            messages: anthropic_messages,
            system,
            temperature,
            stop_sequences: stop.map(|s| s.to_vec()),
            stream: true,
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::LlmUnavailable(format!("anthropic stream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LlmUnavailable(format!("anthropic returned {status}: {body}")));
        }

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut output_tokens = 0u32;

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        yield Err(Error::LlmUnavailable(format!("anthropic stream read failed: {e}")));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim().to_string();
                    buffer.drain(..=line_end);
                    let Some(json_str) = line.strip_prefix("data: ") else { continue };
                    if json_str.is_empty() {
                        continue;
                    }
                    let Ok(event) = serde_json::from_str::<StreamEvent>(json_str) else { continue };
                    match event {
                        StreamEvent::ContentBlockDelta { delta: StreamDelta::TextDelta { text } } => {
                            yield Ok(TextChunk::Delta(text));
                        }
                        StreamEvent::MessageDelta { usage: Some(usage) } => {
                            output_tokens = usage.output_tokens;
                        }
                        _ => {}
                    }
                }
            }
            yield Ok(TextChunk::Done { tokens: output_tokens });
        };

        Ok(Box::pin(stream))
    }

    /// No tokenizer dependency is carried for this provider; Anthropic
    /// does not expose a public tokenizer, so this is the same
    /// chars-per-token heuristic (~4 chars/token for English text)
    /// commonly used to budget context windows before a real call.
    async fn count_tokens(&self, text: &str) -> Result<u32> {
        Ok(((text.chars().count() as f32) / 4.0).ceil() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_rejected_at_construction() {
        let config = AnthropicConfig::new("");
        assert!(AnthropicProvider::new(config).is_err());
    }

    #[tokio::test]
    async fn token_estimate_scales_with_text_length() {
        let provider = AnthropicProvider::new(AnthropicConfig::new("test-key")).unwrap();
        let short = provider.count_tokens("hi").await.unwrap();
        let long = provider.count_tokens(&"hello world ".repeat(50)).await.unwrap();
        assert!(long > short);
    }
}

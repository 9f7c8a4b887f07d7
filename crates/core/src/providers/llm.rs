//! `LLMProvider` (§6.2).

use crate::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub tokens: u32,
}

/// One chunk of a streaming generation (§4.8). The final element of the
/// stream is always a terminal chunk carrying the aggregate token count
/// rather than new text, so consumers can distinguish "more text
/// coming" from "generation complete".
#[derive(Debug, Clone)]
pub enum TextChunk {
    Delta(String),
    Done { tokens: u32 },
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        stop: Option<&[String]>,
    ) -> Result<GenerationResponse>;

    /// Streaming variant (§4.8); cancellation is expressed by the
    /// consumer dropping the returned stream before it is exhausted.
    async fn generate_stream(
        &self,
        messages: &[ChatMessage],
        model: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        stop: Option<&[String]>,
    ) -> Result<BoxStream<'static, Result<TextChunk>>>;

    /// Used by prompt assembly to keep requests under the model's
    /// context window before calling `generate`.
    async fn count_tokens(&self, text: &str) -> Result<u32>;
}

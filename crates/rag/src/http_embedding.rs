//! HTTP-based `EmbeddingProvider`, speaking an OpenAI-compatible
//! `/embeddings` wire format (the same shape Ollama, vLLM, and most
//! self-hosted embedding servers expose).

use align_core::providers::EmbeddingProvider;
use align_core::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpEmbeddingConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub default_model: String,
    pub dimensions: usize,
    pub timeout: Duration,
}

impl HttpEmbeddingConfig {
    pub fn new(endpoint: impl Into<String>, default_model: impl Into<String>, dimensions: usize) -> Self {
        Self { endpoint: endpoint.into(), api_key: None, default_model: default_model.into(), dimensions, timeout: Duration::from_secs(30) }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

pub struct HttpEmbeddingProvider {
    config: HttpEmbeddingConfig,
    client: Client,
}

impl HttpEmbeddingProvider {
    pub fn new(config: HttpEmbeddingConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build().map_err(|e| Error::internal(format!("building embedding http client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    async fn embed(&self, texts: &[String], model: Option<&str>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = model.unwrap_or(&self.config.default_model);
        let mut request = self.client.post(format!("{}/embeddings", self.config.endpoint)).json(&EmbeddingRequest { model, input: texts });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| Error::LlmUnavailable(format!("embedding request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LlmUnavailable(format!("embedding endpoint returned {status}: {body}")));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| Error::LlmUnavailable(format!("decoding embedding response: {e}")))?;
        let mut vectors = vec![Vec::new(); texts.len()];
        for datum in parsed.data {
            if datum.index < vectors.len() {
                vectors[datum.index] = datum.embedding;
            }
        }
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_reports_requested_dimensions() {
        let config = HttpEmbeddingConfig::new("http://localhost:11434/v1", "nomic-embed-text", 768);
        let provider = HttpEmbeddingProvider::new(config).unwrap();
        assert_eq!(provider.dimensions(), 768);
    }

    #[tokio::test]
    async fn empty_input_short_circuits_without_a_request() {
        let config = HttpEmbeddingConfig::new("http://localhost:1", "model", 8);
        let provider = HttpEmbeddingProvider::new(config).unwrap();
        let result = provider.embed(&[], None).await.unwrap();
        assert!(result.is_empty());
    }
}

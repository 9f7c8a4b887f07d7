//! HTTP-based `RerankProvider`, speaking the Cohere/Jina-style
//! `/rerank` wire format most self-hosted cross-encoder servers expose.

use align_core::providers::rerank::RerankedItem;
use align_core::providers::RerankProvider;
use align_core::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpRerankConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub default_model: String,
    pub timeout: Duration,
}

impl HttpRerankConfig {
    pub fn new(endpoint: impl Into<String>, default_model: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), api_key: None, default_model: default_model.into(), timeout: Duration::from_secs(30) }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

pub struct HttpRerankProvider {
    config: HttpRerankConfig,
    client: Client,
}

impl HttpRerankProvider {
    pub fn new(config: HttpRerankConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build().map_err(|e| Error::internal(format!("building rerank http client: {e}")))?;
        Ok(Self { config, client })
    }
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    top_n: Option<usize>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

#[async_trait]
impl RerankProvider for HttpRerankProvider {
    async fn rerank(&self, query: &str, documents: &[String], model: Option<&str>, top_k: Option<usize>) -> Result<Vec<RerankedItem>> {
        if documents.is_empty() {
            return Ok(vec![]);
        }

        let model = model.unwrap_or(&self.config.default_model);
        let mut request = self.client.post(format!("{}/rerank", self.config.endpoint)).json(&RerankRequest { model, query, documents, top_n: top_k });
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| Error::LlmUnavailable(format!("rerank request failed: {e}")))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::LlmUnavailable(format!("rerank endpoint returned {status}: {body}")));
        }

        let parsed: RerankResponse = response.json().await.map_err(|e| Error::LlmUnavailable(format!("decoding rerank response: {e}")))?;
        let mut items: Vec<RerankedItem> = parsed.results.into_iter().map(|r| RerankedItem { index: r.index, score: r.relevance_score }).collect();
        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(k) = top_k {
            items.truncate(k);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_documents_short_circuit_without_a_request() {
        let config = HttpRerankConfig::new("http://localhost:1", "rerank-model");
        let provider = HttpRerankProvider::new(config).unwrap();
        let result = provider.rerank("query", &[], None, None).await.unwrap();
        assert!(result.is_empty());
    }
}

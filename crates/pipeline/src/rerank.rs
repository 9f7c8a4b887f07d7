//! Reranker (§4.4): an optional cross-encoder pass over retrieval
//! candidates. Disabled, or a failing provider, degrades to the input
//! order unchanged rather than aborting the turn (§7: "recoverable
//! failures within a stage... are logged and the stage is bypassed with
//! the previous stage's output").

use align_config::RerankingConfig;
use align_core::providers::RerankProvider;
use std::sync::Arc;

pub struct Reranker {
    provider: Arc<dyn RerankProvider>,
    config: RerankingConfig,
}

impl Reranker {
    pub fn new(provider: Arc<dyn RerankProvider>, config: RerankingConfig) -> Self {
        Self { provider, config }
    }

    /// Rerank `items` against `query`, using `text_of` to extract the
    /// document text each candidate contributes to the provider call.
    /// Returns `items` reordered (and truncated to `top_k` when
    /// configured); on a disabled stage or provider error, returns
    /// `items` unchanged.
    #[tracing::instrument(skip(self, items, text_of), fields(enabled = self.config.enabled, count = items.len()))]
    pub async fn rerank<T>(&self, query: &str, items: Vec<T>, text_of: impl Fn(&T) -> &str) -> Vec<T> {
        if !self.config.enabled || items.is_empty() {
            return items;
        }
        let documents: Vec<String> = items.iter().map(|item| text_of(item).to_string()).collect();
        match self
            .provider
            .rerank(query, &documents, Some(&self.config.model), Some(self.config.top_k))
            .await
        {
            Ok(reranked) => {
                let mut items: Vec<Option<T>> = items.into_iter().map(Some).collect();
                reranked
                    .into_iter()
                    .filter_map(|r| items.get_mut(r.index).and_then(Option::take))
                    .collect()
            }
            Err(err) => {
                tracing::warn!(error = %err, "rerank provider failed, bypassing stage");
                items
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::providers::RerankedItem;
    use align_core::Result;
    use async_trait::async_trait;

    struct ReverseOrder;

    #[async_trait]
    impl RerankProvider for ReverseOrder {
        async fn rerank(
            &self,
            _query: &str,
            documents: &[String],
            _model: Option<&str>,
            _top_k: Option<usize>,
        ) -> Result<Vec<RerankedItem>> {
            Ok((0..documents.len())
                .rev()
                .map(|index| RerankedItem { index, score: index as f32 })
                .collect())
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl RerankProvider for AlwaysFails {
        async fn rerank(
            &self,
            _query: &str,
            _documents: &[String],
            _model: Option<&str>,
            _top_k: Option<usize>,
        ) -> Result<Vec<RerankedItem>> {
            Err(align_core::Error::internal("rerank down"))
        }
    }

    #[tokio::test]
    async fn reorders_items_by_provider_response() {
        let reranker = Reranker::new(
            Arc::new(ReverseOrder),
            RerankingConfig { enabled: true, model: "m".into(), top_k: 10 },
        );
        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let out = reranker.rerank("q", items, |s| s.as_str()).await;
        assert_eq!(out, vec!["c".to_string(), "b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn disabled_stage_bypasses_provider() {
        let reranker = Reranker::new(
            Arc::new(ReverseOrder),
            RerankingConfig { enabled: false, model: "m".into(), top_k: 10 },
        );
        let items = vec!["a".to_string(), "b".to_string()];
        let out = reranker.rerank("q", items.clone(), |s| s.as_str()).await;
        assert_eq!(out, items);
    }

    #[tokio::test]
    async fn provider_failure_bypasses_stage() {
        let reranker = Reranker::new(
            Arc::new(AlwaysFails),
            RerankingConfig { enabled: true, model: "m".into(), top_k: 10 },
        );
        let items = vec!["a".to_string(), "b".to_string()];
        let out = reranker.rerank("q", items.clone(), |s| s.as_str()).await;
        assert_eq!(out, items);
    }
}

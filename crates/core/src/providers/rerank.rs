//! `RerankProvider` (§6.2).

use crate::Result;
use async_trait::async_trait;

/// One reordered result: `index` refers back into the caller's original
/// `documents` slice so the reranker need not echo document text back.
#[derive(Debug, Clone, Copy)]
pub struct RerankedItem {
    pub index: usize,
    pub score: f32,
}

#[async_trait]
pub trait RerankProvider: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        model: Option<&str>,
        top_k: Option<usize>,
    ) -> Result<Vec<RerankedItem>>;
}

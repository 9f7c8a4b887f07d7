//! `EmbeddingProvider` (§6.2).

use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Fixed output dimension for this provider/model; every vector
    /// returned by `embed` has exactly this length.
    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String], model: Option<&str>) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str, model: Option<&str>) -> Result<Vec<f32>> {
        let mut vectors = self.embed(std::slice::from_ref(&text.to_string()), model).await?;
        Ok(vectors.pop().unwrap_or_default())
    }
}

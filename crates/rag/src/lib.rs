//! Concrete external integrations the pipeline is written against but
//! never constructs itself (§6.2): an HTTP `EmbeddingProvider`, an HTTP
//! `RerankProvider`, and a tantivy-backed `ConfigStore` decorator that
//! fuses dense rule embeddings with sparse full-text search via
//! reciprocal rank fusion.

mod hybrid_config_store;
mod http_embedding;
mod http_rerank;

pub use hybrid_config_store::HybridConfigStore;
pub use http_embedding::HttpEmbeddingProvider;
pub use http_rerank::HttpRerankProvider;

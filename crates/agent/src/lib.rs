//! `AlignmentEngine`: wires tenant-scoped stores, LLM/embedding/rerank
//! providers, and the default tool registry into one ready-to-use
//! `PipelineOrchestrator` that a thin transport layer can hold and
//! call directly (concrete store/provider backends are the caller's
//! choice to supply).

use align_config::Settings;
use align_core::providers::{EmbeddingProvider, LlmProvider, RerankProvider};
use align_core::stores::{AuditStore, ConfigStore, MemoryStore, ProfileStore, SessionStore};
use align_core::tool::Tool;
use align_core::Result;
use align_persistence::{InMemoryAuditStore, InMemoryConfigStore, InMemoryMemoryStore, InMemoryProfileStore, InMemorySessionStore};
use align_pipeline::PipelineOrchestrator;
use align_rag::HybridConfigStore;
use std::sync::Arc;

/// The external collaborators a deployer supplies: an LLM, an embedder,
/// and a reranker. `align_llm::AnthropicProvider` and `align_rag`'s HTTP
/// clients are ready-made concrete choices; tests typically supply
/// stubs instead.
pub struct AlignmentEngineProviders {
    pub llm: Arc<dyn LlmProvider>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub reranker: Arc<dyn RerankProvider>,
}

pub struct AlignmentEngine {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub settings: Arc<Settings>,
}

impl AlignmentEngine {
    /// Assemble an engine backed by the in-memory reference stores
    /// (§6.1), a tantivy-backed hybrid rule index (§4.3), and
    /// `align_tools`'s example tools pre-registered (none activated by
    /// default; callers opt individual agents into them via
    /// `tool_activations()`).
    pub fn bootstrap(settings: Settings, providers: AlignmentEngineProviders) -> Result<Self> {
        let config_store: Arc<dyn ConfigStore> = Arc::new(HybridConfigStore::new(Arc::new(InMemoryConfigStore::new()))?);
        let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let audit_store: Arc<dyn AuditStore> = Arc::new(InMemoryAuditStore::new());
        let memory_store: Arc<dyn MemoryStore> = Arc::new(InMemoryMemoryStore::new());
        let profile_store: Arc<dyn ProfileStore> = Arc::new(InMemoryProfileStore::new());

        Self::with_stores(settings, providers, config_store, session_store, audit_store, memory_store, profile_store)
    }

    /// Assemble an engine over caller-supplied stores (e.g. a test
    /// harness's fixtures, or a future persistent backend implementing
    /// the same traits).
    #[allow(clippy::too_many_arguments)]
    pub fn with_stores(
        settings: Settings,
        providers: AlignmentEngineProviders,
        config_store: Arc<dyn ConfigStore>,
        session_store: Arc<dyn SessionStore>,
        audit_store: Arc<dyn AuditStore>,
        memory_store: Arc<dyn MemoryStore>,
        profile_store: Arc<dyn ProfileStore>,
    ) -> Result<Self> {
        let (tools, _tool_ids): (Vec<Arc<dyn Tool>>, _) = align_tools::build_default_registry();
        tracing::info!(tool_count = tools.len(), "registered example tools");

        let settings = Arc::new(settings);
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            config_store,
            session_store,
            audit_store,
            memory_store,
            profile_store,
            providers.llm,
            providers.embedder,
            providers.reranker,
            tools,
            settings.clone(),
        ));

        Ok(Self { orchestrator, settings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::providers::llm::{ChatMessage, GenerationResponse, TextChunk};
    use align_core::providers::rerank::RerankedItem;
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    struct StubLlm;
    #[async_trait]
    impl LlmProvider for StubLlm {
        async fn generate(&self, _messages: &[ChatMessage], _model: Option<&str>, _max_tokens: u32, _temperature: f32, _stop: Option<&[String]>) -> Result<GenerationResponse> {
            Ok(GenerationResponse { text: "ok".to_string(), tokens: 1 })
        }
        async fn generate_stream(&self, _messages: &[ChatMessage], _model: Option<&str>, _max_tokens: u32, _temperature: f32, _stop: Option<&[String]>) -> Result<BoxStream<'static, Result<TextChunk>>> {
            unimplemented!("not exercised by this test")
        }
        async fn count_tokens(&self, text: &str) -> Result<u32> {
            Ok(text.len() as u32)
        }
    }

    struct StubEmbedder;
    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn dimensions(&self) -> usize {
            4
        }
        async fn embed(&self, texts: &[String], _model: Option<&str>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.0; 4]).collect())
        }
    }

    struct StubReranker;
    #[async_trait]
    impl RerankProvider for StubReranker {
        async fn rerank(&self, _query: &str, documents: &[String], _model: Option<&str>, _top_k: Option<usize>) -> Result<Vec<RerankedItem>> {
            Ok(documents.iter().enumerate().map(|(index, _)| RerankedItem { index, score: 1.0 }).collect())
        }
    }

    #[test]
    fn bootstrap_assembles_an_orchestrator() {
        let providers = AlignmentEngineProviders { llm: Arc::new(StubLlm), embedder: Arc::new(StubEmbedder), reranker: Arc::new(StubReranker) };
        let engine = AlignmentEngine::bootstrap(Settings::default(), providers).unwrap();
        assert!(Arc::strong_count(&engine.orchestrator) >= 1);
    }
}

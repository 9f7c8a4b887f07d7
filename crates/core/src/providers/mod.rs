//! Provider interfaces consumed by the core (§6.2): the boundary between
//! the pipeline and concrete LLM/embedding/rerank backends. Concrete
//! backends (an HTTP client for a hosted model, a local inference
//! runtime) are out of scope (§1); only the trait and its contract are
//! specified here.

pub mod embedding;
pub mod llm;
pub mod rerank;

pub use embedding::EmbeddingProvider;
pub use llm::{ChatMessage, ChatRole, GenerationResponse, LlmProvider, TextChunk};
pub use rerank::{RerankProvider, RerankedItem};

//! Concrete `LlmProvider`: an Anthropic Messages API client with native
//! SSE streaming. No tool-use passthrough — tool invocation is the
//! pipeline's `ToolExecutor`'s job, not the generation call's.

mod anthropic;

pub use anthropic::{AnthropicConfig, AnthropicModel, AnthropicProvider};

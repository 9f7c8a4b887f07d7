//! The `Tool` interface (§4.7): an external action a matched rule can
//! invoke. Concrete tools live outside this crate (`align-tools` ships
//! in-memory examples); this module only defines the seam the tool
//! executor is written against.

use crate::ids::ToolId;
use crate::variable::VarValue;
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Declarative input resolution for one tool argument: where to pull its
/// value from before invocation (§4.7 "a small name→source-path mapping
/// resolved before invocation").
#[derive(Debug, Clone)]
pub enum InputSource {
    ContextEntity(String),
    SessionVariable(String),
    ProfileField(String),
    /// A fixed value baked into the rule/tool wiring, not resolved from
    /// runtime state.
    Literal(VarValue),
}

#[derive(Debug, Clone)]
pub struct ToolInputSpec {
    pub name: String,
    pub source: InputSource,
    pub required: bool,
}

/// Resolved inputs for one invocation, keyed by `ToolInputSpec::name`.
pub type ToolInputs = HashMap<String, VarValue>;

/// Key/value outputs a tool wants merged back into `session.variables`.
pub type ToolOutputs = HashMap<String, VarValue>;

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub tool_id: ToolId,
    pub inputs: ToolInputs,
    pub output: ToolOutputs,
    pub success: bool,
    pub error: Option<String>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> ToolId;

    fn name(&self) -> &str;

    /// Which inputs this tool needs and where to resolve them from.
    fn input_spec(&self) -> Vec<ToolInputSpec>;

    /// Run the tool against already-resolved inputs. Implementations
    /// should treat `inputs` as complete per `input_spec` — the executor
    /// fails the call with `Error::ToolFailed` before invoking `run` when
    /// a required input could not be resolved, rather than calling `run`
    /// with a hole (§4.7: "missing-required-input treated as a tool
    /// failure rather than a panic").
    async fn run(&self, inputs: &ToolInputs) -> Result<ToolOutputs>;
}

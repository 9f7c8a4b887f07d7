//! Tool Executor (§4.7): bounded-parallel, timeboxed invocation of the
//! tools attached to this turn's matched rules.

use crate::context::Context;
use align_config::ToolExecutionConfig;
use align_core::ids::{AgentId, TenantId, ToolId};
use align_core::stores::ConfigStore;
use align_core::tool::{InputSource, Tool, ToolInputs, ToolResult};
use align_core::variable::VarMap;
use align_core::Error;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub struct ToolExecutor {
    registry: HashMap<ToolId, Arc<dyn Tool>>,
    config_store: Arc<dyn ConfigStore>,
    config: ToolExecutionConfig,
}

impl ToolExecutor {
    pub fn new(tools: Vec<Arc<dyn Tool>>, config_store: Arc<dyn ConfigStore>, config: ToolExecutionConfig) -> Self {
        let registry = tools.into_iter().map(|t| (t.id(), t)).collect();
        Self { registry, config_store, config }
    }

    fn resolve_inputs(
        tool: &dyn Tool,
        context: &Context,
        session_variables: &VarMap,
        profile_fields: &VarMap,
    ) -> Result<ToolInputs, String> {
        let mut inputs = ToolInputs::new();
        for spec in tool.input_spec() {
            let value = match &spec.source {
                InputSource::ContextEntity(name) => context.entity(name).map(|v| v.to_string().into()),
                InputSource::SessionVariable(name) => session_variables.get(name).cloned(),
                InputSource::ProfileField(name) => profile_fields.get(name).cloned(),
                InputSource::Literal(value) => Some(value.clone()),
            };
            match value {
                Some(v) => {
                    inputs.insert(spec.name.clone(), v);
                }
                None if spec.required => {
                    return Err(format!("required input '{}' could not be resolved", spec.name));
                }
                None => {}
            }
        }
        Ok(inputs)
    }

    /// Run every tool in `tool_ids`, bounded to `max_parallel` concurrent
    /// invocations, each timeboxed to `timeout_ms` (or the tool's own
    /// `ToolPolicyOverrides.timeout_ms`). When `fail_fast` is set, the
    /// first failure aborts every still-outstanding tool task.
    #[tracing::instrument(skip(self, tool_ids, context, session_variables, profile_fields), fields(tenant = %tenant_id, agent = %agent_id, count = tool_ids.len()))]
    pub async fn execute(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        tool_ids: &HashSet<ToolId>,
        context: &Context,
        session_variables: &VarMap,
        profile_fields: &VarMap,
    ) -> align_core::Result<Vec<ToolResult>> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel.max(1)));
        let mut join_set: JoinSet<ToolResult> = JoinSet::new();

        for &tool_id in tool_ids {
            let Some(tool) = self.registry.get(&tool_id).cloned() else { continue };

            let activation = self.config_store.get_tool_activation(tenant_id, agent_id, tool_id).await?;
            if activation.as_ref().is_some_and(|a| !a.enabled) {
                continue;
            }
            let timeout_ms = activation
                .and_then(|a| a.overrides.timeout_ms)
                .unwrap_or(self.config.timeout_ms);

            let inputs = match Self::resolve_inputs(tool.as_ref(), context, session_variables, profile_fields) {
                Ok(inputs) => inputs,
                Err(reason) => {
                    join_set.spawn(async move {
                        ToolResult { tool_id, inputs: ToolInputs::new(), output: Default::default(), success: false, error: Some(reason) }
                    });
                    continue;
                }
            };

            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let result = tokio::time::timeout(
                    std::time::Duration::from_millis(timeout_ms),
                    tool.run(&inputs),
                )
                .await;
                match result {
                    Ok(Ok(output)) => ToolResult { tool_id, inputs, output, success: true, error: None },
                    Ok(Err(e)) => ToolResult { tool_id, inputs, output: Default::default(), success: false, error: Some(e.to_string()) },
                    Err(_) => ToolResult { tool_id, inputs, output: Default::default(), success: false, error: Some("tool timed out".to_string()) },
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    let failed = !result.success;
                    results.push(result);
                    if failed && self.config.fail_fast {
                        join_set.abort_all();
                    }
                }
                Err(e) if e.is_cancelled() => continue,
                Err(e) => return Err(Error::internal(format!("tool task panicked: {e}"))),
            }
        }

        Ok(results)
    }
}

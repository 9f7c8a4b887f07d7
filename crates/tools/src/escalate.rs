//! A tool a hard-constraint rule or a scenario's `escalate` fallback
//! (§4.6) attaches to hand a conversation to a human agent.

use align_core::ids::ToolId;
use align_core::tool::{InputSource, Tool, ToolInputSpec, ToolInputs, ToolOutputs};
use align_core::variable::VarValue;
use align_core::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub struct EscalateToHumanTool {
    id: ToolId,
}

impl EscalateToHumanTool {
    pub fn new(id: ToolId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Tool for EscalateToHumanTool {
    fn id(&self) -> ToolId {
        self.id
    }

    fn name(&self) -> &str {
        "escalate_to_human"
    }

    fn input_spec(&self) -> Vec<ToolInputSpec> {
        vec![ToolInputSpec {
            name: "reason".to_string(),
            source: InputSource::ContextEntity("escalation_reason".to_string()),
            required: false,
        }]
    }

    async fn run(&self, inputs: &ToolInputs) -> Result<ToolOutputs> {
        let reason = inputs.get("reason").map(|v| v.to_string()).unwrap_or_else(|| "unspecified".to_string());
        tracing::info!(reason = %reason, "escalating session to a human agent");

        let mut outputs = ToolOutputs::new();
        outputs.insert("escalation_ticket_id".to_string(), VarValue::from(Uuid::new_v4().to_string()));
        outputs.insert("escalated".to_string(), VarValue::from(true));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_produces_a_ticket_id() {
        let tool = EscalateToHumanTool::new(ToolId::new());
        let outputs = tool.run(&ToolInputs::new()).await.unwrap();
        assert_eq!(outputs.get("escalated").unwrap().as_bool(), Some(true));
        assert!(outputs.contains_key("escalation_ticket_id"));
    }
}

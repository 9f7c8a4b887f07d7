//! Simulated outbound notification (SMS/email/push) delivery, standing
//! in for whatever messaging provider a production deployment wires up.

use align_core::ids::ToolId;
use align_core::tool::{InputSource, Tool, ToolInputSpec, ToolInputs, ToolOutputs};
use align_core::variable::VarValue;
use align_core::{Error, Result};
use async_trait::async_trait;

pub struct SendNotificationTool {
    id: ToolId,
}

impl SendNotificationTool {
    pub fn new(id: ToolId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Tool for SendNotificationTool {
    fn id(&self) -> ToolId {
        self.id
    }

    fn name(&self) -> &str {
        "send_notification"
    }

    fn input_spec(&self) -> Vec<ToolInputSpec> {
        vec![
            ToolInputSpec { name: "channel".to_string(), source: InputSource::ProfileField("preferred_channel".to_string()), required: false },
            ToolInputSpec { name: "message".to_string(), source: InputSource::ContextEntity("notification_message".to_string()), required: true },
        ]
    }

    async fn run(&self, inputs: &ToolInputs) -> Result<ToolOutputs> {
        let message = inputs.get("message").ok_or_else(|| Error::ToolFailed("missing notification message".to_string()))?;
        let channel = inputs.get("channel").map(|v| v.to_string()).unwrap_or_else(|| "sms".to_string());

        if message.to_string().trim().is_empty() {
            return Err(Error::ToolFailed("notification message is empty".to_string()));
        }

        tracing::info!(channel = %channel, "sent simulated notification");
        let mut outputs = ToolOutputs::new();
        outputs.insert("notification_sent".to_string(), VarValue::from(true));
        outputs.insert("notification_channel".to_string(), VarValue::from(channel));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_message_fails() {
        let tool = SendNotificationTool::new(ToolId::new());
        let mut inputs = ToolInputs::new();
        inputs.insert("message".to_string(), VarValue::from(""));
        assert!(tool.run(&inputs).await.is_err());
    }

    #[tokio::test]
    async fn non_empty_message_succeeds() {
        let tool = SendNotificationTool::new(ToolId::new());
        let mut inputs = ToolInputs::new();
        inputs.insert("message".to_string(), VarValue::from("your request was received"));
        let outputs = tool.run(&inputs).await.unwrap();
        assert_eq!(outputs.get("notification_sent").unwrap().as_bool(), Some(true));
    }
}

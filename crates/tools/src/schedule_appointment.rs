//! Simulated scheduling tool, standing in for a real calendar/booking
//! integration. Required inputs are resolved by the tool executor
//! (§4.7) before `run` is ever called, so a missing `requested_at`
//! surfaces as a tool failure rather than a scheduling attempt with a
//! bad date.

use align_core::ids::ToolId;
use align_core::tool::{InputSource, Tool, ToolInputSpec, ToolInputs, ToolOutputs};
use align_core::variable::VarValue;
use align_core::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub struct ScheduleAppointmentTool {
    id: ToolId,
}

impl ScheduleAppointmentTool {
    pub fn new(id: ToolId) -> Self {
        Self { id }
    }
}

#[async_trait]
impl Tool for ScheduleAppointmentTool {
    fn id(&self) -> ToolId {
        self.id
    }

    fn name(&self) -> &str {
        "schedule_appointment"
    }

    fn input_spec(&self) -> Vec<ToolInputSpec> {
        vec![ToolInputSpec { name: "requested_at".to_string(), source: InputSource::ContextEntity("requested_at".to_string()), required: true }]
    }

    async fn run(&self, inputs: &ToolInputs) -> Result<ToolOutputs> {
        let requested_at = inputs.get("requested_at").ok_or_else(|| Error::ToolFailed("requested_at could not be resolved".to_string()))?;

        let when: DateTime<Utc> = match requested_at {
            VarValue::DateTime(dt) => *dt,
            VarValue::String(s) => DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)).map_err(|e| Error::ToolFailed(format!("requested_at is not a valid timestamp: {e}")))?,
            other => return Err(Error::ToolFailed(format!("requested_at has unexpected type: {other:?}"))),
        };

        if when < Utc::now() {
            return Err(Error::ToolFailed("requested_at is in the past".to_string()));
        }

        let mut outputs = ToolOutputs::new();
        outputs.insert("appointment_id".to_string(), VarValue::from(Uuid::new_v4().to_string()));
        outputs.insert("appointment_confirmed_for".to_string(), VarValue::DateTime(when));
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn past_appointment_is_rejected() {
        let tool = ScheduleAppointmentTool::new(ToolId::new());
        let mut inputs = ToolInputs::new();
        inputs.insert("requested_at".to_string(), VarValue::DateTime(Utc::now() - Duration::days(1)));
        assert!(tool.run(&inputs).await.is_err());
    }

    #[tokio::test]
    async fn future_appointment_is_confirmed() {
        let tool = ScheduleAppointmentTool::new(ToolId::new());
        let mut inputs = ToolInputs::new();
        inputs.insert("requested_at".to_string(), VarValue::DateTime(Utc::now() + Duration::days(1)));
        let outputs = tool.run(&inputs).await.unwrap();
        assert!(outputs.contains_key("appointment_id"));
    }
}

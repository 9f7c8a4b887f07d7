//! Convenience constructor wiring the example tools into the `Vec<Arc<dyn
//! Tool>>` the pipeline's `ToolExecutor` (§4.7) expects, plus matching
//! `ToolActivation` rows so a fresh `ConfigStore` has them enabled.

use align_core::entities::{ToolActivation, ToolPolicyOverrides};
use align_core::ids::{AgentId, TenantId, ToolId};
use align_core::tool::Tool;
use std::sync::Arc;

use crate::{EscalateToHumanTool, LookupAccountTool, ScheduleAppointmentTool, SendNotificationTool};

/// One freshly-generated `ToolId` per example tool, built once by
/// `build_default_registry` and handed back so callers can reference the
/// same ids when authoring `Rule.attached_tool_ids`.
pub struct ToolIds {
    pub escalate: ToolId,
    pub notify: ToolId,
    pub lookup_account: ToolId,
    pub schedule_appointment: ToolId,
}

pub fn build_default_registry() -> (Vec<Arc<dyn Tool>>, ToolIds) {
    let ids = ToolIds { escalate: ToolId::new(), notify: ToolId::new(), lookup_account: ToolId::new(), schedule_appointment: ToolId::new() };

    let tools: Vec<Arc<dyn Tool>> = vec![
        Arc::new(EscalateToHumanTool::new(ids.escalate)),
        Arc::new(SendNotificationTool::new(ids.notify)),
        Arc::new(LookupAccountTool::new(ids.lookup_account)),
        Arc::new(ScheduleAppointmentTool::new(ids.schedule_appointment)),
    ];

    (tools, ids)
}

/// Default (enabled, no overrides) `ToolActivation` rows for every tool
/// in `ids`, ready to hand to `ConfigStore::save_tool_activation`.
pub fn default_activations(tenant_id: TenantId, agent_id: AgentId, ids: &ToolIds) -> Vec<ToolActivation> {
    [ids.escalate, ids.notify, ids.lookup_account, ids.schedule_appointment]
        .into_iter()
        .map(|tool_id| ToolActivation { tenant_id, agent_id, tool_id, enabled: true, overrides: ToolPolicyOverrides::default() })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_one_entry_per_tool() {
        let (tools, ids) = build_default_registry();
        assert_eq!(tools.len(), 4);
        let activations = default_activations(TenantId::new(), AgentId::new(), &ids);
        assert_eq!(activations.len(), 4);
        assert!(activations.iter().all(|a| a.enabled));
    }
}

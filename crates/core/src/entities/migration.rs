//! Migration plan entities (§4.9).

use crate::ids::{AgentId, MigrationPlanId, ScenarioId, StepId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The remediation a single anchor requires when migrating a session from
/// one scenario version to the next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AnchorPolicy {
    /// No upstream changes affecting data collection: silently teleport.
    CleanGraft,
    /// Upstream added required data collection: resolve via the gap-fill
    /// service before teleporting.
    GapFill { required_fields: Vec<String> },
    /// Upstream changed branching: evaluate the new fork against current
    /// state; if it differs, ask the customer to confirm at a checkpoint.
    ReRoute { checkpoint_step_id: StepId },
}

/// Per-anchor mapping from the V1 anchor step to its V2 equivalent, plus
/// the policy computed for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorMapping {
    pub v1_step_id: StepId,
    pub v2_step_id: StepId,
    /// First 16 hex chars of the anchor's `content_hash`; used by
    /// `SessionStore.find_sessions_by_step_hash` to locate affected
    /// sessions without walking the whole scenario.
    pub anchor_hash: String,
    pub policy: AnchorPolicy,
}

/// Sufficient for a fresh `MigrationExecutor` to apply the migration
/// without recomputing the scenario diff (§6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationMap {
    pub anchors: Vec<AnchorMapping>,
}

impl TransformationMap {
    pub fn anchor_for_hash(&self, hash: &str) -> Option<&AnchorMapping> {
        self.anchors.iter().find(|a| a.anchor_hash == hash)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPlanStatus {
    Pending,
    Approved,
    Rejected,
    Deployed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub id: MigrationPlanId,
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub scenario_id: ScenarioId,
    pub from_version: u32,
    pub to_version: u32,
    pub transformation_map: TransformationMap,
    pub scope_filter: Option<String>,
    pub warnings: Vec<String>,
    pub summary: String,
    pub status: MigrationPlanStatus,
    pub created_at: DateTime<Utc>,
}

impl MigrationPlan {
    pub fn is_deployable(&self) -> bool {
        matches!(self.status, MigrationPlanStatus::Approved)
    }
}

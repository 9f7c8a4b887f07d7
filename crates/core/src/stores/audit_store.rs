//! `AuditStore` (§6.1): append-only turn-record persistence plus generic
//! audit events.

use crate::entities::TurnRecord;
use crate::ids::{AgentId, SessionId, TenantId, TurnId};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// A generic, free-form audit event (migration deployments, publish
/// actions, and other operator-triggered facts that are not turn
/// records themselves).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub tenant_id: TenantId,
    pub agent_id: Option<AgentId>,
    pub kind: String,
    pub detail: serde_json::Value,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Write-once: implementations must reject a second `save_turn` for
    /// the same `TurnId` (§3 Lifecycle: "Turn records are write-once").
    async fn save_turn(&self, turn: TurnRecord) -> Result<()>;

    async fn get_turn(&self, tenant_id: TenantId, turn_id: TurnId) -> Result<TurnRecord>;

    async fn list_turns_by_session(
        &self,
        tenant_id: TenantId,
        session_id: SessionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<TurnRecord>>;

    async fn list_turns_by_tenant(&self, tenant_id: TenantId, time_range: TimeRange) -> Result<Vec<TurnRecord>>;

    async fn record_event(&self, event: AuditEvent) -> Result<()>;
}

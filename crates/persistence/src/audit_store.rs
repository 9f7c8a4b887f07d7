//! In-memory `AuditStore` (§6.1): append-only turn records, write-once
//! per `TurnId` (§3 Lifecycle).

use align_core::entities::TurnRecord;
use align_core::ids::{SessionId, TenantId, TurnId};
use align_core::stores::audit_store::{AuditEvent, TimeRange};
use align_core::stores::AuditStore;
use align_core::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryAuditStore {
    turns: DashMap<(TenantId, TurnId), TurnRecord>,
    events: DashMap<usize, AuditEvent>,
    next_event_id: std::sync::atomic::AtomicUsize,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn save_turn(&self, turn: TurnRecord) -> Result<()> {
        let key = (turn.tenant_id, turn.id);
        if self.turns.contains_key(&key) {
            return Err(Error::Conflict(format!("turn {} already recorded", turn.id)));
        }
        self.turns.insert(key, turn);
        Ok(())
    }

    async fn get_turn(&self, tenant_id: TenantId, turn_id: TurnId) -> Result<TurnRecord> {
        self.turns.get(&(tenant_id, turn_id)).map(|e| e.clone()).ok_or_else(|| Error::not_found(format!("turn {turn_id}")))
    }

    async fn list_turns_by_session(&self, tenant_id: TenantId, session_id: SessionId, limit: usize, offset: usize) -> Result<Vec<TurnRecord>> {
        let mut turns: Vec<TurnRecord> = self
            .turns
            .iter()
            .map(|e| e.value().clone())
            .filter(|t| t.tenant_id == tenant_id && t.session_id == session_id)
            .collect();
        turns.sort_by_key(|t| t.turn_number);
        Ok(turns.into_iter().skip(offset).take(limit).collect())
    }

    async fn list_turns_by_tenant(&self, tenant_id: TenantId, time_range: TimeRange) -> Result<Vec<TurnRecord>> {
        let mut turns: Vec<TurnRecord> = self
            .turns
            .iter()
            .map(|e| e.value().clone())
            .filter(|t| t.tenant_id == tenant_id && t.timestamp >= time_range.from && t.timestamp <= time_range.to)
            .collect();
        turns.sort_by_key(|t| t.timestamp);
        Ok(turns)
    }

    async fn record_event(&self, event: AuditEvent) -> Result<()> {
        let id = self.next_event_id.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.events.insert(id, event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::entities::ScenarioPointer;
    use align_core::ids::{AgentId, TurnId};
    use chrono::Utc;

    fn turn(tenant: TenantId, session: SessionId, turn_number: u64) -> TurnRecord {
        TurnRecord {
            tenant_id: tenant,
            agent_id: AgentId::new(),
            session_id: session,
            id: TurnId::new(),
            turn_number,
            user_message: "hi".into(),
            agent_response: "hello".into(),
            matched_rule_ids: vec![],
            tool_calls: vec![],
            scenario_before: ScenarioPointer::empty(),
            scenario_after: ScenarioPointer::empty(),
            latency_ms: 10,
            tokens_used: 5,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn write_once_rejects_duplicate_turn_id() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::new();
        let t = turn(tenant, SessionId::new(), 1);
        let dup = TurnRecord { id: t.id, ..turn(tenant, SessionId::new(), 2) };
        store.save_turn(t).await.unwrap();
        assert!(store.save_turn(dup).await.is_err());
    }

    #[tokio::test]
    async fn list_by_session_is_ordered_by_turn_number() {
        let store = InMemoryAuditStore::new();
        let tenant = TenantId::new();
        let session = SessionId::new();
        store.save_turn(turn(tenant, session, 2)).await.unwrap();
        store.save_turn(turn(tenant, session, 1)).await.unwrap();

        let turns = store.list_turns_by_session(tenant, session, 10, 0).await.unwrap();
        assert_eq!(turns.iter().map(|t| t.turn_number).collect::<Vec<_>>(), vec![1, 2]);
    }
}

//! In-memory `SessionStore` (§6.1), including the `find_sessions_by_step_hash`
//! lookup the migration deployer (§4.9) needs to mark affected sessions.

use crate::hashing::content_hash;
use align_core::entities::Scenario;
use align_core::ids::{AgentId, ProfileId, ScenarioId, SessionId, TenantId};
use align_core::session::Session;
use align_core::stores::SessionStore;
use align_core::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<(TenantId, SessionId), Session>,
    by_channel: DashMap<(TenantId, String, String), SessionId>,
    /// Archived scenario snapshots this store consults to resolve a
    /// session's current step into a content hash (§4.9). A real backend
    /// would instead join against `ConfigStore`; kept local here so
    /// `align-persistence` has no dependency on `align-pipeline`.
    scenario_snapshots: DashMap<(TenantId, ScenarioId, u32), Scenario>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a scenario version snapshot this store can hash sessions
    /// against. Callers (typically the migration deployer's test harness,
    /// or a thin adapter in production) invoke this whenever
    /// `ConfigStore::archive_scenario_version` is called so the two
    /// stores stay in sync.
    pub fn index_scenario_version(&self, scenario: Scenario) {
        self.scenario_snapshots.insert((scenario.header.tenant_id(), scenario.id, scenario.version), scenario);
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, tenant_id: TenantId, session_id: SessionId) -> Result<Session> {
        self.sessions.get(&(tenant_id, session_id)).map(|e| e.clone()).ok_or_else(|| Error::not_found(format!("session {session_id}")))
    }

    async fn save(&self, session: Session) -> Result<()> {
        let key = (session.tenant_id, session.id);
        if let Some(existing) = self.sessions.get(&key) {
            if existing.version > session.version {
                return Err(Error::Conflict(format!("session {} was updated concurrently", session.id)));
            }
        }
        self.by_channel.insert((session.tenant_id, session.channel.clone(), session.user_channel_id.clone()), session.id);
        self.sessions.insert(key, session);
        Ok(())
    }

    async fn delete(&self, tenant_id: TenantId, session_id: SessionId) -> Result<()> {
        self.sessions.remove(&(tenant_id, session_id));
        Ok(())
    }

    async fn get_by_channel(&self, tenant_id: TenantId, channel: &str, user_channel_id: &str) -> Result<Option<Session>> {
        let Some(session_id) = self.by_channel.get(&(tenant_id, channel.to_string(), user_channel_id.to_string())).map(|e| *e) else {
            return Ok(None);
        };
        Ok(self.sessions.get(&(tenant_id, session_id)).map(|e| e.clone()))
    }

    async fn list_by_agent(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Session>> {
        Ok(self.sessions.iter().map(|e| e.value().clone()).filter(|s| s.tenant_id == tenant_id && s.agent_id == agent_id).collect())
    }

    async fn list_by_customer(&self, tenant_id: TenantId, customer_profile_id: ProfileId) -> Result<Vec<Session>> {
        Ok(self
            .sessions
            .iter()
            .map(|e| e.value().clone())
            .filter(|s| s.tenant_id == tenant_id && s.customer_profile_id == customer_profile_id)
            .collect())
    }

    async fn find_sessions_by_step_hash(
        &self,
        tenant_id: TenantId,
        scenario_id: ScenarioId,
        version: u32,
        step_content_hash: &str,
        scope_filter: Option<&str>,
    ) -> Result<Vec<SessionId>> {
        let Some(snapshot) = self.scenario_snapshots.get(&(tenant_id, scenario_id, version)) else {
            return Ok(Vec::new());
        };

        let matching_step_ids: std::collections::HashSet<_> = snapshot
            .steps
            .iter()
            .filter(|step| content_hash(step) == step_content_hash)
            .map(|step| step.id)
            .collect();

        Ok(self
            .sessions
            .iter()
            .filter(|e| {
                let s = e.value();
                s.tenant_id == tenant_id
                    && s.active_scenario_id == Some(scenario_id)
                    && s.active_scenario_version == Some(version)
                    && s.active_step_id.is_some_and(|id| matching_step_ids.contains(&id))
                    && scope_filter.map_or(true, |filter| s.channel == filter)
            })
            .map(|e| e.value().id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use align_core::entities::{ScenarioStep, StepTransition, StepType};
    use align_core::ids::StepId;
    use align_core::tenant::AgentScoped;

    #[tokio::test]
    async fn get_by_channel_round_trips() {
        let store = InMemorySessionStore::new();
        let tenant = TenantId::new();
        let session = Session::new(tenant, AgentId::new(), ProfileId::new(), "web", "user-1");
        let id = session.id;
        store.save(session).await.unwrap();

        let found = store.get_by_channel(tenant, "web", "user-1").await.unwrap().unwrap();
        assert_eq!(found.id, id);
    }

    #[tokio::test]
    async fn stale_version_save_is_rejected() {
        let store = InMemorySessionStore::new();
        let tenant = TenantId::new();
        let mut session = Session::new(tenant, AgentId::new(), ProfileId::new(), "web", "u");
        session.version = 5;
        store.save(session.clone()).await.unwrap();

        session.version = 1;
        assert!(store.save(session).await.is_err());
    }

    #[tokio::test]
    async fn finds_sessions_parked_at_anchor_hash() {
        let store = InMemorySessionStore::new();
        let tenant = TenantId::new();
        let agent = AgentId::new();
        let scenario_id = ScenarioId::new();
        let step_id = StepId::new();

        let step = ScenarioStep {
            id: step_id,
            step_type: StepType::Interaction,
            description: Some("collect iban".into()),
            local_rule_ids: vec![],
            required_fields: vec![],
            transitions: vec![StepTransition { target_step_id: step_id, condition: None, intent_match: None, llm_adjudication_hint: None }],
        };
        let hash = content_hash(&step);

        let scenario = Scenario {
            header: AgentScoped::new(tenant, agent),
            id: scenario_id,
            version: 1,
            entry_step_id: step_id,
            entry_examples: vec![],
            entry_example_embeddings: vec![],
            intent_label: None,
            steps: vec![step],
        };
        store.index_scenario_version(scenario);

        let mut session = Session::new(tenant, agent, ProfileId::new(), "web", "u1");
        session.start_scenario(scenario_id, step_id, 1);
        let session_id = session.id;
        store.save(session).await.unwrap();

        let found = store.find_sessions_by_step_hash(tenant, scenario_id, 1, &hash, None).await.unwrap();
        assert_eq!(found, vec![session_id]);
    }
}

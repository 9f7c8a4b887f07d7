//! Session entity (§3): ephemeral-but-persisted conversation state.

use crate::ids::{AgentId, MigrationPlanId, ProfileId, ScenarioId, SessionId, StepId, TenantId};
use crate::variable::VarMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound on `Session.step_history` length (§3, §8).
pub const MAX_STEP_HISTORY: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepVisit {
    pub step_id: StepId,
    pub entered_at: DateTime<Utc>,
    pub turn_number: u64,
    pub reason: String,
    pub confidence: f32,
}

/// Frozen pointer to an in-flight migration: which plan applies, and the
/// anchor hash the session was at when it was marked pending. The
/// `MigrationExecutor` looks both up at the start of the next turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMigration {
    pub plan_id: MigrationPlanId,
    pub anchor_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub id: SessionId,
    pub customer_profile_id: ProfileId,
    pub channel: String,
    pub user_channel_id: String,

    pub active_scenario_id: Option<ScenarioId>,
    pub active_step_id: Option<StepId>,
    pub active_scenario_version: Option<u32>,

    pub variables: VarMap,
    pub rule_fires: HashMap<String, u32>,
    pub rule_last_fire_turn: HashMap<String, u64>,

    pub step_history: Vec<StepVisit>,
    pub relocalization_count: u32,

    pub turn_count: u64,
    pub last_activity_at: DateTime<Utc>,

    pub pending_migration: Option<PendingMigration>,

    /// Optimistic-concurrency version, bumped on every `save` (see §5
    /// Ordering guarantees; this repo's chosen strategy is a per-session
    /// logical lock, but the version is still recorded for audit parity
    /// with the persisted-layout contract in §6.4).
    pub version: u64,
}

impl Session {
    pub fn new(
        tenant_id: TenantId,
        agent_id: AgentId,
        customer_profile_id: ProfileId,
        channel: impl Into<String>,
        user_channel_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            tenant_id,
            agent_id,
            id: SessionId::new(),
            customer_profile_id,
            channel: channel.into(),
            user_channel_id: user_channel_id.into(),
            active_scenario_id: None,
            active_step_id: None,
            active_scenario_version: None,
            variables: VarMap::new(),
            rule_fires: HashMap::new(),
            rule_last_fire_turn: HashMap::new(),
            step_history: Vec::new(),
            relocalization_count: 0,
            turn_count: 0,
            last_activity_at: now,
            pending_migration: None,
            version: 0,
        }
    }

    /// Append a visit, trimming the history to `MAX_STEP_HISTORY` from the
    /// front (§3, §8c).
    pub fn push_step_visit(&mut self, visit: StepVisit) {
        self.step_history.push(visit);
        if self.step_history.len() > MAX_STEP_HISTORY {
            let overflow = self.step_history.len() - MAX_STEP_HISTORY;
            self.step_history.drain(0..overflow);
        }
    }

    /// Count of visits to `step_id` within the trailing `window` entries
    /// of `step_history`, used by loop detection (§4.6).
    pub fn visits_within_window(&self, step_id: StepId, window: usize) -> usize {
        let start = self.step_history.len().saturating_sub(window);
        self.step_history[start..]
            .iter()
            .filter(|v| v.step_id == step_id)
            .count()
    }

    pub fn clear_scenario(&mut self) {
        self.active_scenario_id = None;
        self.active_step_id = None;
        self.active_scenario_version = None;
        self.relocalization_count = 0;
    }

    pub fn start_scenario(&mut self, scenario_id: ScenarioId, step_id: StepId, version: u32) {
        self.active_scenario_id = Some(scenario_id);
        self.active_step_id = Some(step_id);
        self.active_scenario_version = Some(version);
        self.relocalization_count = 0;
    }

    pub fn record_rule_fire(&mut self, rule_id: &str, turn_number: u64) {
        *self.rule_fires.entry(rule_id.to_string()).or_insert(0) += 1;
        self.rule_last_fire_turn.insert(rule_id.to_string(), turn_number);
    }

    pub fn touch(&mut self) {
        self.turn_count += 1;
        self.last_activity_at = Utc::now();
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_session() -> Session {
        Session::new(TenantId::new(), AgentId::new(), ProfileId::new(), "web", "u1")
    }

    #[test]
    fn step_history_is_trimmed_to_max() {
        let mut s = new_session();
        for i in 0..(MAX_STEP_HISTORY + 10) {
            s.push_step_visit(StepVisit {
                step_id: StepId::new(),
                entered_at: Utc::now(),
                turn_number: i as u64,
                reason: "test".into(),
                confidence: 1.0,
            });
        }
        assert_eq!(s.step_history.len(), MAX_STEP_HISTORY);
    }

    #[test]
    fn exiting_clears_all_scenario_fields() {
        let mut s = new_session();
        s.start_scenario(ScenarioId::new(), StepId::new(), 1);
        s.clear_scenario();
        assert!(s.active_scenario_id.is_none());
        assert!(s.active_step_id.is_none());
        assert!(s.active_scenario_version.is_none());
    }
}

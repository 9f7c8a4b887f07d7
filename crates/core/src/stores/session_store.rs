//! `SessionStore` (§6.1): session CRUD plus the channel/step-hash lookups
//! the orchestrator and migration subsystem depend on.

use crate::ids::{AgentId, ProfileId, ScenarioId, SessionId, TenantId};
use crate::session::Session;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, tenant_id: TenantId, session_id: SessionId) -> Result<Session>;

    /// Persist `session`. Implementations must reject the write (return
    /// `Error::Conflict`) if `session.version` does not match the
    /// currently stored version, when the deployment's chosen ordering
    /// strategy (§5) is optimistic concurrency rather than a logical
    /// per-session lock.
    async fn save(&self, session: Session) -> Result<()>;

    async fn delete(&self, tenant_id: TenantId, session_id: SessionId) -> Result<()>;

    async fn get_by_channel(
        &self,
        tenant_id: TenantId,
        channel: &str,
        user_channel_id: &str,
    ) -> Result<Option<Session>>;

    async fn list_by_agent(&self, tenant_id: TenantId, agent_id: AgentId) -> Result<Vec<Session>>;

    async fn list_by_customer(&self, tenant_id: TenantId, customer_profile_id: ProfileId) -> Result<Vec<Session>>;

    /// Locate sessions parked at a given anchor's content hash so the
    /// `MigrationDeployer` can mark them `pending_migration` (§4.9).
    /// `scope_filter` is an opaque operator-supplied narrowing (e.g. only
    /// sessions active in the last N days); `None` matches all.
    async fn find_sessions_by_step_hash(
        &self,
        tenant_id: TenantId,
        scenario_id: ScenarioId,
        version: u32,
        step_content_hash: &str,
        scope_filter: Option<&str>,
    ) -> Result<Vec<SessionId>>;
}

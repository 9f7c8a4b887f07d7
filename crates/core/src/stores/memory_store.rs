//! `MemoryStore` (§6.1): the interface the pipeline consumes for
//! long-term memory retrieval and async ingestion. Full ingestion of
//! entities/relationships/summaries is out of scope (§1); this is only
//! the read/write surface the Turn Pipeline itself calls.

use crate::ids::{AgentId, TenantId};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single remembered episode (one past turn or summarized fact) in a
/// session's memory group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub memory_group: String,
    pub text: String,
    pub embedding: Vec<f32>,
    /// Dedup key for at-least-once ingestion consumers (§9 Design Notes:
    /// "consumers idempotent (dedup on episode content hash)").
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub tenant_id: TenantId,
    pub name: String,
    pub entity_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub from_entity_id: String,
    pub to_entity_id: String,
    pub relation_type: String,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn add_episode(&self, episode: Episode) -> Result<()>;
    async fn get_episode(&self, tenant_id: TenantId, id: &str) -> Result<Option<Episode>>;

    /// Vector search over episodes in `memory_group`; callers fall back
    /// to `search_text` when the embedding provider is unavailable (§4.3).
    async fn search_vector(
        &self,
        tenant_id: TenantId,
        memory_group: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<Episode>>;

    async fn search_text(
        &self,
        tenant_id: TenantId,
        memory_group: &str,
        query_text: &str,
        limit: usize,
    ) -> Result<Vec<Episode>>;

    async fn upsert_entity(&self, entity: EntityRecord) -> Result<()>;
    async fn upsert_relationship(&self, relationship: RelationshipRecord) -> Result<()>;

    async fn traverse_from_entities(
        &self,
        tenant_id: TenantId,
        entity_ids: &[String],
        depth: u32,
        relation_types: Option<&[String]>,
    ) -> Result<Vec<EntityRecord>>;

    async fn delete_by_group(&self, tenant_id: TenantId, memory_group: &str) -> Result<()>;
}

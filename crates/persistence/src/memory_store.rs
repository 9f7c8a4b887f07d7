//! In-memory `MemoryStore` (§6.1): the read/write surface the Turn
//! Pipeline consumes for long-term memory. Full ingestion of
//! entities/relationships/summaries into a knowledge graph is out of
//! scope (§1); this only backs the narrow interface the pipeline calls.

use align_core::ids::TenantId;
use align_core::stores::memory_store::{Episode, EntityRecord, RelationshipRecord};
use align_core::stores::MemoryStore;
use align_core::vector::cosine_similarity;
use align_core::Result;
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Default)]
pub struct InMemoryMemoryStore {
    episodes: DashMap<(TenantId, String), Episode>,
    entities: DashMap<(TenantId, String), EntityRecord>,
    relationships: parking_lot::Mutex<Vec<RelationshipRecord>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn add_episode(&self, episode: Episode) -> Result<()> {
        // At-least-once ingestion consumers dedup on content hash (§9
        // Design Notes); re-ingesting the same episode is a no-op rather
        // than a duplicate.
        let key = (episode.tenant_id, episode.content_hash.clone());
        self.episodes.entry(key).or_insert(episode);
        Ok(())
    }

    async fn get_episode(&self, tenant_id: TenantId, id: &str) -> Result<Option<Episode>> {
        Ok(self.episodes.iter().map(|e| e.value().clone()).find(|e| e.tenant_id == tenant_id && e.id == id))
    }

    async fn search_vector(&self, tenant_id: TenantId, memory_group: &str, query_embedding: &[f32], limit: usize) -> Result<Vec<Episode>> {
        let mut scored: Vec<(f32, Episode)> = self
            .episodes
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| e.tenant_id == tenant_id && e.memory_group == memory_group)
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    async fn search_text(&self, tenant_id: TenantId, memory_group: &str, query_text: &str, limit: usize) -> Result<Vec<Episode>> {
        let query_lower = query_text.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        let mut scored: Vec<(usize, Episode)> = self
            .episodes
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| e.tenant_id == tenant_id && e.memory_group == memory_group)
            .map(|e| {
                let text_lower = e.text.to_lowercase();
                let hits = terms.iter().filter(|t| text_lower.contains(**t)).count();
                (hits, e)
            })
            .filter(|(hits, _)| *hits > 0)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }

    async fn upsert_entity(&self, entity: EntityRecord) -> Result<()> {
        self.entities.insert((entity.tenant_id, entity.id.clone()), entity);
        Ok(())
    }

    async fn upsert_relationship(&self, relationship: RelationshipRecord) -> Result<()> {
        // Relationships are not tenant-stamped individually; callers are
        // expected to only traverse entities they already own, so
        // `traverse_from_entities` relies on the caller-supplied,
        // already-tenant-scoped `entity_ids` to keep the walk scoped.
        self.relationships.lock().push(relationship);
        Ok(())
    }

    async fn traverse_from_entities(
        &self,
        tenant_id: TenantId,
        entity_ids: &[String],
        depth: u32,
        relation_types: Option<&[String]>,
    ) -> Result<Vec<EntityRecord>> {
        let all_relationships: Vec<RelationshipRecord> = self.relationships.lock().clone();

        let mut frontier: std::collections::HashSet<String> = entity_ids.iter().cloned().collect();
        let mut visited = frontier.clone();

        for _ in 0..depth {
            let mut next = std::collections::HashSet::new();
            for rel in &all_relationships {
                if relation_types.is_some_and(|types| !types.contains(&rel.relation_type)) {
                    continue;
                }
                if frontier.contains(&rel.from_entity_id) && !visited.contains(&rel.to_entity_id) {
                    next.insert(rel.to_entity_id.clone());
                }
            }
            if next.is_empty() {
                break;
            }
            visited.extend(next.iter().cloned());
            frontier = next;
        }

        Ok(self
            .entities
            .iter()
            .map(|e| e.value().clone())
            .filter(|e| e.tenant_id == tenant_id && visited.contains(&e.id))
            .collect())
    }

    async fn delete_by_group(&self, tenant_id: TenantId, memory_group: &str) -> Result<()> {
        self.episodes.retain(|_, e| !(e.tenant_id == tenant_id && e.memory_group == memory_group));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn episode(tenant: TenantId, group: &str, text: &str, embedding: Vec<f32>, hash: &str) -> Episode {
        Episode {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant,
            agent_id: align_core::ids::AgentId::new(),
            memory_group: group.into(),
            text: text.into(),
            embedding,
            content_hash: hash.into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn ingestion_is_idempotent_on_content_hash() {
        let store = InMemoryMemoryStore::new();
        let tenant = TenantId::new();
        store.add_episode(episode(tenant, "g1", "a", vec![1.0], "h1")).await.unwrap();
        store.add_episode(episode(tenant, "g1", "a", vec![1.0], "h1")).await.unwrap();

        let results = store.search_vector(tenant, "g1", &[1.0], 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn text_search_falls_back_when_no_embedding_match_needed() {
        let store = InMemoryMemoryStore::new();
        let tenant = TenantId::new();
        store.add_episode(episode(tenant, "g1", "refund requested for order 42", vec![], "h1")).await.unwrap();

        let results = store.search_text(tenant, "g1", "refund order", 10).await.unwrap();
        assert_eq!(results.len(), 1);
    }
}

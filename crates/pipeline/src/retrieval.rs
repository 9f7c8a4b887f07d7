//! Retrieval (§4.3): scoped rule retrieval, scenario entry-candidate
//! scoring, and memory retrieval, each followed by dynamic k-selection.
//!
//! `ConfigStore::vector_search_rules` is the one retrieval call the
//! store boundary (§6.1) exposes for rules; merging in BM25/text search
//! is an implementation detail of that store method (a production
//! backend is free to fuse dense + sparse internally via
//! `reciprocal_rank_fusion`, see `align_core::vector`). Scenario candidates have no dedicated
//! store method, so this stage fetches the scenario list once and
//! scores `entry_example_embeddings` in-process.

use align_config::{RetrievalConfig, SelectionStrategyKind, SelectionStrategyParams};
use align_core::entities::{Rule, RuleScope, Scenario};
use align_core::ids::{AgentId, TenantId};
use align_core::selection::{AdaptiveK, Cluster, Elbow, EntropySelection, FixedK, SelectionBounds, SelectionStrategy};
use align_core::session::Session;
use align_core::stores::{ConfigStore, Episode, MemoryStore};
use align_core::vector::cosine_similarity;
use align_core::Result;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RuleCandidate {
    pub rule: Rule,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ScenarioCandidate {
    pub scenario: Scenario,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct MemoryCandidate {
    pub episode: Episode,
    pub score: f32,
}

pub fn build_strategy(kind: SelectionStrategyKind, params: SelectionStrategyParams) -> Box<dyn SelectionStrategy> {
    match kind {
        SelectionStrategyKind::FixedK => Box::new(FixedK { k: params.k, min_score: 0.0 }),
        SelectionStrategyKind::Elbow => Box::new(Elbow { drop_threshold: params.drop_threshold, min_score: 0.0 }),
        SelectionStrategyKind::AdaptiveK => Box::new(AdaptiveK { alpha: params.alpha, min_score: 0.0 }),
        SelectionStrategyKind::Entropy => Box::new(EntropySelection {
            low_k: params.low_k,
            high_k: params.high_k,
            entropy_threshold: params.entropy_threshold,
        }),
        SelectionStrategyKind::Cluster => Box::new(Cluster {
            eps: params.eps,
            min_samples: params.min_samples,
            top_per_cluster: params.top_per_cluster,
        }),
    }
}

/// Apply business filters from §4.3: enabled, fire-count cap, cooldown.
fn passes_business_filters(rule: &Rule, session: &Session, current_turn: u64) -> bool {
    if !rule.enabled || rule.header.is_deleted() {
        return false;
    }
    let rule_id = rule.id.to_string();
    if !rule.is_unlimited_fires() {
        let fires = session.rule_fires.get(&rule_id).copied().unwrap_or(0);
        if fires >= rule.max_fires_per_session {
            return false;
        }
    }
    if rule.cooldown_turns > 0 {
        if let Some(&last_fire) = session.rule_last_fire_turn.get(&rule_id) {
            if current_turn.saturating_sub(last_fire) < rule.cooldown_turns as u64 {
                return false;
            }
        }
    }
    true
}

pub struct Retriever {
    config_store: Arc<dyn ConfigStore>,
    memory_store: Arc<dyn MemoryStore>,
    retrieval: RetrievalConfig,
    memory_top_k: usize,
}

impl Retriever {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        memory_store: Arc<dyn MemoryStore>,
        retrieval: RetrievalConfig,
        memory_top_k: usize,
    ) -> Self {
        Self { config_store, memory_store, retrieval, memory_top_k }
    }

    /// Scoped rule retrieval (§4.3 steps 1-3): the three scope fetches
    /// run concurrently; selection is applied per scope so a scope with
    /// many strong candidates cannot starve another scope's budget, then
    /// results are concatenated preserving GLOBAL ⟶ SCENARIO ⟶ STEP
    /// precedence for any downstream stable sort.
    #[tracing::instrument(skip(self, session, query_embedding), fields(tenant = %tenant_id, agent = %agent_id))]
    pub async fn retrieve_rules(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        session: &Session,
        query_embedding: &[f32],
    ) -> Result<Vec<RuleCandidate>> {
        let strategy = build_strategy(self.retrieval.selection_strategy, self.retrieval.strategy_params);
        let bounds = SelectionBounds { min_k: 0, max_k: self.retrieval.top_k };

        let global_fut = self.config_store.vector_search_rules(
            query_embedding, tenant_id, agent_id, None, None, self.retrieval.top_k, self.retrieval.min_score,
        );
        let scenario_fut = async {
            match session.active_scenario_id {
                Some(scenario_id) => {
                    self.config_store
                        .vector_search_rules(
                            query_embedding, tenant_id, agent_id,
                            Some(RuleScope::Scenario), Some(&scenario_id.to_string()),
                            self.retrieval.top_k, self.retrieval.min_score,
                        )
                        .await
                }
                None => Ok(Vec::new()),
            }
        };
        let step_fut = async {
            match session.active_step_id {
                Some(step_id) => {
                    self.config_store
                        .vector_search_rules(
                            query_embedding, tenant_id, agent_id,
                            Some(RuleScope::Step), Some(&step_id.to_string()),
                            self.retrieval.top_k, self.retrieval.min_score,
                        )
                        .await
                }
                None => Ok(Vec::new()),
            }
        };

        let (global, scenario, step) = tokio::try_join!(global_fut, scenario_fut, step_fut)?;

        let mut out = Vec::new();
        for scored in [global, scenario, step] {
            let mut scored: Vec<_> = scored
                .into_iter()
                .filter(|s| passes_business_filters(&s.rule, session, session.turn_count))
                .collect();
            scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            let scores: Vec<f32> = scored.iter().map(|s| s.score).collect();
            let keep = strategy.select(&scores, bounds);
            out.extend(scored.into_iter().take(keep).map(|s| RuleCandidate { rule: s.rule, score: s.score }));
        }
        Ok(out)
    }

    /// Scenario entry-candidate retrieval (§4.3): only meaningful when no
    /// scenario is currently active, but computed unconditionally so the
    /// navigator (§4.6) can also use it to evaluate whether a competing
    /// scenario's entry score clears `exit_intent_threshold`.
    #[tracing::instrument(skip(self, query_embedding), fields(tenant = %tenant_id, agent = %agent_id))]
    pub async fn retrieve_scenario_candidates(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        query_embedding: &[f32],
    ) -> Result<Vec<ScenarioCandidate>> {
        let scenarios = self.config_store.list_scenarios(tenant_id, agent_id).await?;
        let mut out = Vec::new();
        for scenario in scenarios {
            if scenario.header.is_deleted() {
                continue;
            }
            let best = scenario
                .entry_example_embeddings
                .iter()
                .map(|emb| cosine_similarity(query_embedding, emb))
                .fold(f32::MIN, f32::max);
            let score = if best == f32::MIN { 0.0 } else { best };
            out.push(ScenarioCandidate { scenario, score });
        }
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        Ok(out)
    }

    /// Memory retrieval (§4.3): vector search over the session's memory
    /// group with a text-search fallback when embeddings return nothing
    /// (provider outage, cold memory group).
    #[tracing::instrument(skip(self, query_embedding), fields(tenant = %tenant_id))]
    pub async fn retrieve_memory(
        &self,
        tenant_id: TenantId,
        memory_group: &str,
        query_text: &str,
        query_embedding: &[f32],
    ) -> Result<Vec<MemoryCandidate>> {
        let vector_hits = self
            .memory_store
            .search_vector(tenant_id, memory_group, query_embedding, self.memory_top_k)
            .await?;
        let episodes = if vector_hits.is_empty() {
            self.memory_store.search_text(tenant_id, memory_group, query_text, self.memory_top_k).await?
        } else {
            vector_hits
        };
        Ok(episodes
            .into_iter()
            .map(|episode| {
                let score = cosine_similarity(query_embedding, &episode.embedding);
                MemoryCandidate { episode, score }
            })
            .collect())
    }
}

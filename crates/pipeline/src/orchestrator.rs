//! `PipelineOrchestrator` (§4.1): wires the eight turn-pipeline stages,
//! the migration executor, and the ambient concurrency/idempotency
//! plumbing into the one per-message entry point the rest of the system
//! calls.
//!
//! Stage order follows §4.1 exactly: context extraction, retrieval,
//! rerank, rule filter, scenario navigation, tool execution, generation,
//! enforcement. A stage's recoverable failure is expected to be
//! absorbed internally (the reranker and rule filter already degrade to
//! a bypass on provider error, §7); anything that still surfaces here as
//! an `Err` is treated as fatal and aborts the turn before any write.

use crate::context::ContextExtractor;
use crate::enforcer::Enforcer;
use crate::generator::{GenerationContext, ResponseGenerator};
use crate::idempotency::IdempotencyCache;
use crate::locking::SessionLockRegistry;
use crate::migration::{MigrationExecutor, ReconciliationOutcome};
use crate::retrieval::Retriever;
use crate::rerank::Reranker;
use crate::rule_filter::RuleFilter;
use crate::scenario_filter::{NavigationAction, ScenarioNavigator, NO_MATCH_REASON};
use crate::tool_executor::ToolExecutor;
use align_config::{FallbackBehavior, Settings};
use align_core::entities::{
    CustomerProfile, Rule, RuleScope, ScenarioPointer, Template, TemplateMode, ToolCallRecord, TurnRecord,
};
use align_core::ids::{AgentId, RuleId, SessionId, TemplateId, TenantId, ToolId, TurnId};
use align_core::providers::{ChatMessage, EmbeddingProvider, LlmProvider, RerankProvider};
use align_core::session::{Session, StepVisit};
use align_core::stores::{AuditStore, ConfigStore, Episode, MemoryStore, ProfileStore, SessionStore};
use align_core::tool::Tool;
use align_core::variable::{merge_environments, VarMap, VarValue};
use align_core::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct AlignmentRequest {
    pub tenant_id: TenantId,
    pub agent_id: AgentId,
    pub channel: String,
    pub user_channel_id: String,
    pub message: String,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct AlignmentResult {
    pub session_id: SessionId,
    pub turn_id: TurnId,
    pub response_text: String,
    pub matched_rule_ids: Vec<RuleId>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub violations: Vec<crate::enforcer::Violation>,
    pub stage_timings: Vec<StageTiming>,
}

pub struct PipelineOrchestrator {
    config_store: Arc<dyn ConfigStore>,
    session_store: Arc<dyn SessionStore>,
    audit_store: Arc<dyn AuditStore>,
    memory_store: Arc<dyn MemoryStore>,
    profile_store: Arc<dyn ProfileStore>,

    context_extractor: ContextExtractor,
    retriever: Retriever,
    reranker: Reranker,
    rule_filter: RuleFilter,
    navigator: ScenarioNavigator,
    tool_executor: ToolExecutor,
    generator: ResponseGenerator,
    enforcer: Enforcer,
    migration_executor: MigrationExecutor,

    locks: SessionLockRegistry,
    idempotency: IdempotencyCache,
    settings: Arc<Settings>,
}

impl PipelineOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        session_store: Arc<dyn SessionStore>,
        audit_store: Arc<dyn AuditStore>,
        memory_store: Arc<dyn MemoryStore>,
        profile_store: Arc<dyn ProfileStore>,
        llm: Arc<dyn LlmProvider>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Arc<dyn RerankProvider>,
        tools: Vec<Arc<dyn Tool>>,
        settings: Arc<Settings>,
    ) -> Self {
        let p = &settings.pipeline;
        let context_extractor = ContextExtractor::new(p.context_extraction.clone(), llm.clone(), embedder.clone());
        let retriever = Retriever::new(config_store.clone(), memory_store.clone(), p.retrieval.clone(), settings.memory.top_k);
        let reranker_stage = Reranker::new(reranker, p.reranking.clone());
        let rule_filter = RuleFilter::new(llm.clone(), p.rule_filter.clone());
        let navigator = ScenarioNavigator::new(p.scenario_filter.clone(), llm.clone());
        let tool_executor = ToolExecutor::new(tools, config_store.clone(), p.tool_execution.clone());
        let generator = ResponseGenerator::new(llm.clone(), p.generation.clone());
        let enforcer = Enforcer::new(llm.clone(), Some(embedder.clone()), p.enforcement.clone());
        let gap_fill =
            crate::migration::GapFillService::new(profile_store.clone(), llm.clone(), p.migration.gap_fill.clone());
        let migration_executor = MigrationExecutor::new(config_store.clone(), profile_store.clone(), gap_fill);

        Self {
            config_store,
            session_store,
            audit_store,
            memory_store,
            profile_store,
            context_extractor,
            retriever,
            reranker: reranker_stage,
            rule_filter,
            navigator,
            tool_executor,
            generator,
            enforcer,
            migration_executor,
            locks: SessionLockRegistry::new(),
            idempotency: IdempotencyCache::new(),
            settings,
        }
    }

    /// Run one full turn (§4.1): resolve session/profile, reconcile any
    /// pending scenario migration, run the eight stages in order, apply
    /// the navigation outcome, persist, and enqueue memory ingestion.
    #[tracing::instrument(skip(self, request), fields(tenant = %request.tenant_id, agent = %request.agent_id))]
    pub async fn align(&self, request: AlignmentRequest) -> Result<AlignmentResult> {
        let turn_started = Instant::now();

        if let Some(key) = &request.idempotency_key {
            if let Some(cached) = self.idempotency.get(request.tenant_id, key, &self.settings.idempotency) {
                return Ok(cached);
            }
        }

        let agent = self.config_store.get_agent(request.tenant_id, request.agent_id).await?;
        let profile = self
            .profile_store
            .get_or_create(
                request.tenant_id,
                request.agent_id,
                &request.channel,
                &request.user_channel_id,
                agent.profile_schema_version,
            )
            .await?;

        let mut session = match self
            .session_store
            .get_by_channel(request.tenant_id, &request.channel, &request.user_channel_id)
            .await?
        {
            Some(session) => session,
            None => Session::new(request.tenant_id, request.agent_id, profile.id, request.channel.clone(), request.user_channel_id.clone()),
        };

        let _lock = self.locks.acquire(session.id).await;
        session.touch();

        let recon = self.migration_executor.reconcile(request.tenant_id, &mut session, &request.message).await?;
        if let Some(short_circuit) = self.short_circuit_text(&recon) {
            return self
                .finish_short_circuit(request, session, short_circuit, turn_started)
                .await;
        }

        let scenario_before = scenario_pointer(&session);
        let mut timings = Vec::new();

        let history = self.load_history(request.tenant_id, session.id, &agent).await?;
        let context = self
            .timed(&mut timings, "context_extraction", self.context_extractor.extract(&request.message, &history))
            .await?;

        let rule_candidates = self
            .timed(
                &mut timings,
                "retrieval",
                self.retriever.retrieve_rules(request.tenant_id, request.agent_id, &session, &context.embedding),
            )
            .await?;
        let scenario_candidates = self
            .retriever
            .retrieve_scenario_candidates(request.tenant_id, request.agent_id, &context.embedding)
            .await?;
        let memory_group = profile.id.to_string();
        let memory_candidates = if self.settings.memory.enabled {
            self.retriever
                .retrieve_memory(request.tenant_id, &memory_group, &request.message, &context.embedding)
                .await?
        } else {
            Vec::new()
        };

        let reranked_rules = self
            .timed(
                &mut timings,
                "rerank",
                self.reranker.rerank(&request.message, rule_candidates, |c| c.rule.action_text.as_str()),
            )
            .await;

        let (matched, _scenario_signal_override) = self
            .timed(&mut timings, "rule_filter", self.rule_filter.filter(&request.message, &context, &reranked_rules))
            .await?;

        let rule_by_id: HashMap<RuleId, Rule> = reranked_rules.into_iter().map(|c| (c.rule.id, c.rule)).collect();
        let matched_with_rules: Vec<(Rule, crate::rule_filter::MatchedRule)> = matched
            .into_iter()
            .filter_map(|m| rule_by_id.get(&m.rule_id).cloned().map(|rule| (rule, m)))
            .collect();

        let active_scenario = match session.active_scenario_id {
            Some(scenario_id) => Some(self.config_store.get_scenario(request.tenant_id, scenario_id).await?),
            None => None,
        };
        let profile_fields = profile_field_values(&profile);
        let navigation_environment = merge_environments([&profile_fields, &session.variables]);
        let nav_action = self
            .timed(
                &mut timings,
                "scenario_navigation",
                self.navigator.decide(&context, &session, &scenario_candidates, active_scenario.as_ref(), &navigation_environment),
            )
            .await?;
        self.apply_navigation(&mut session, &nav_action);

        let current_scenario = match session.active_scenario_id {
            Some(scenario_id) => Some(self.config_store.get_scenario(request.tenant_id, scenario_id).await?),
            None => None,
        };
        let scenario_step_description = current_scenario
            .as_ref()
            .zip(session.active_step_id)
            .and_then(|(scenario, step_id)| scenario.step(step_id))
            .and_then(|step| step.description.clone());

        let tool_ids: HashSet<ToolId> =
            matched_with_rules.iter().flat_map(|(rule, _)| rule.attached_tool_ids.iter().copied()).collect();
        let tool_results = self
            .timed(
                &mut timings,
                "tool_execution",
                self.tool_executor.execute(
                    request.tenant_id,
                    request.agent_id,
                    &tool_ids,
                    &context,
                    &session.variables,
                    &profile_fields,
                ),
            )
            .await?;
        for result in &tool_results {
            if result.success {
                for (name, value) in &result.output {
                    session.variables.insert(name.clone(), value.clone());
                }
            }
        }

        let templates = self.load_templates(request.tenant_id, &matched_with_rules).await?;
        let fallback_template = templates.values().find(|t| t.mode == TemplateMode::Fallback).cloned();
        let memory_context: Vec<String> = memory_candidates.iter().map(|m| m.episode.text.clone()).collect();

        let gen_ctx = GenerationContext {
            context: &context,
            matched_rules: &matched_with_rules,
            templates: &templates,
            scenario_step_description: scenario_step_description.as_deref(),
            memory_context: &memory_context,
            tool_results: &tool_results,
            profile_fields: &profile_fields,
            session_variables: &session.variables,
            violation_hints: Vec::new(),
        };

        let generation_started = Instant::now();
        let generation_result = self.generator.generate(&request.message, &gen_ctx).await?;
        timings.push(StageTiming { stage: "generation".into(), duration_ms: generation_started.elapsed().as_millis() as u64 });

        let rules_to_enforce = self.rules_to_enforce(request.tenant_id, request.agent_id, &matched_with_rules).await?;
        let base_environment = merge_environments([&profile_fields, &session.variables]);

        let enforcement_started = Instant::now();
        let outcome = self
            .enforcer
            .enforce(
                &self.generator,
                &request.message,
                gen_ctx,
                generation_result,
                &rules_to_enforce,
                &base_environment,
                Some(&context.embedding),
                &memory_context,
                fallback_template.as_ref(),
            )
            .await?;
        timings.push(StageTiming { stage: "enforcement".into(), duration_ms: enforcement_started.elapsed().as_millis() as u64 });

        for (rule, _) in &matched_with_rules {
            session.record_rule_fire(&rule.id.to_string(), session.turn_count);
        }

        let scenario_after = scenario_pointer(&session);
        let turn_id = TurnId::new();
        let turn_record = TurnRecord {
            tenant_id: request.tenant_id,
            agent_id: request.agent_id,
            session_id: session.id,
            id: turn_id,
            turn_number: session.turn_count,
            user_message: request.message.clone(),
            agent_response: outcome.final_text.clone(),
            matched_rule_ids: matched_with_rules.iter().map(|(rule, _)| rule.id).collect(),
            tool_calls: tool_results
                .iter()
                .map(|r| ToolCallRecord { tool_id: r.tool_id, success: r.success, error: r.error.clone() })
                .collect(),
            scenario_before,
            scenario_after,
            latency_ms: turn_started.elapsed().as_millis() as u64,
            tokens_used: outcome.tokens_used,
            timestamp: Utc::now(),
        };

        self.session_store.save(session.clone()).await?;
        self.audit_store.save_turn(turn_record.clone()).await?;
        self.ingest_memory(request.tenant_id, request.agent_id, memory_group, &request.message, &outcome.final_text, context.embedding);

        let result = AlignmentResult {
            session_id: session.id,
            turn_id,
            response_text: outcome.final_text,
            matched_rule_ids: turn_record.matched_rule_ids,
            tool_calls: turn_record.tool_calls,
            violations: outcome.violations,
            stage_timings: timings,
        };

        if let Some(key) = request.idempotency_key {
            self.idempotency.put(request.tenant_id, key, result.clone(), &self.settings.idempotency);
        }

        Ok(result)
    }

    async fn timed<F, T>(&self, timings: &mut Vec<StageTiming>, stage: &str, fut: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let started = Instant::now();
        let out = fut.await;
        timings.push(StageTiming { stage: stage.to_string(), duration_ms: started.elapsed().as_millis() as u64 });
        out
    }

    fn short_circuit_text(&self, recon: &ReconciliationOutcome) -> Option<String> {
        match recon {
            ReconciliationOutcome::NoOp | ReconciliationOutcome::Teleported { .. } => None,
            ReconciliationOutcome::NeedsFields { fields } => {
                Some(format!("Before we continue, could you share your {}?", fields.join(", ")))
            }
            ReconciliationOutcome::NeedsReRouteConfirmation { .. } => {
                Some("This conversation has moved on since you started; would you like to resume from where we last confirmed?".to_string())
            }
        }
    }

    /// Persist a turn that stopped short of the full pipeline because
    /// migration reconciliation still needs information from the
    /// customer (§4.9); `pending_migration` is left untouched so the
    /// next turn retries reconciliation.
    async fn finish_short_circuit(
        &self,
        request: AlignmentRequest,
        mut session: Session,
        response_text: String,
        turn_started: Instant,
    ) -> Result<AlignmentResult> {
        let scenario_before = scenario_pointer(&session);
        let turn_id = TurnId::new();
        let turn_record = TurnRecord {
            tenant_id: request.tenant_id,
            agent_id: request.agent_id,
            session_id: session.id,
            id: turn_id,
            turn_number: session.turn_count,
            user_message: request.message,
            agent_response: response_text.clone(),
            matched_rule_ids: Vec::new(),
            tool_calls: Vec::new(),
            scenario_before: scenario_before.clone(),
            scenario_after: scenario_before,
            latency_ms: turn_started.elapsed().as_millis() as u64,
            tokens_used: 0,
            timestamp: Utc::now(),
        };

        self.session_store.save(session.clone()).await?;
        self.audit_store.save_turn(turn_record).await?;

        let result = AlignmentResult {
            session_id: session.id,
            turn_id,
            response_text,
            matched_rule_ids: Vec::new(),
            tool_calls: Vec::new(),
            violations: Vec::new(),
            stage_timings: Vec::new(),
        };
        if let Some(key) = request.idempotency_key {
            self.idempotency.put(request.tenant_id, key, result.clone(), &self.settings.idempotency);
        }
        session.touch();
        Ok(result)
    }

    fn apply_navigation(&self, session: &mut Session, action: &NavigationAction) {
        let turn_number = session.turn_count;
        match action.clone() {
            NavigationAction::None => {}
            NavigationAction::Start { scenario_id, step_id, version } => {
                session.start_scenario(scenario_id, step_id, version);
                session.push_step_visit(StepVisit {
                    step_id,
                    entered_at: Utc::now(),
                    turn_number,
                    reason: "entry".to_string(),
                    confidence: 1.0,
                });
            }
            NavigationAction::Continue => {
                if let Some(step_id) = session.active_step_id {
                    session.push_step_visit(StepVisit {
                        step_id,
                        entered_at: Utc::now(),
                        turn_number,
                        reason: NO_MATCH_REASON.to_string(),
                        confidence: 0.0,
                    });
                }
            }
            NavigationAction::Transition { step_id } => {
                session.active_step_id = Some(step_id);
                session.push_step_visit(StepVisit {
                    step_id,
                    entered_at: Utc::now(),
                    turn_number,
                    reason: "transition".to_string(),
                    confidence: 1.0,
                });
            }
            NavigationAction::Relocalize { step_id } => {
                session.active_step_id = Some(step_id);
                session.relocalization_count += 1;
                session.push_step_visit(StepVisit {
                    step_id,
                    entered_at: Utc::now(),
                    turn_number,
                    reason: "relocalize".to_string(),
                    confidence: 1.0,
                });
            }
            NavigationAction::Exit => session.clear_scenario(),
            NavigationAction::Fallback(behavior) => {
                if let Some(step_id) = session.active_step_id {
                    session.push_step_visit(StepVisit {
                        step_id,
                        entered_at: Utc::now(),
                        turn_number,
                        reason: format!("fallback_{behavior:?}").to_lowercase(),
                        confidence: 0.0,
                    });
                }
                if behavior == FallbackBehavior::Escalate {
                    session.variables.insert("escalated".to_string(), VarValue::Bool(true));
                }
            }
        }
    }

    async fn load_history(&self, tenant_id: TenantId, session_id: SessionId, agent: &align_core::entities::Agent) -> Result<Vec<ChatMessage>> {
        let limit = (self.settings.pipeline.context_extraction.history_turns as usize).max(1);
        let mut turns = self.audit_store.list_turns_by_session(tenant_id, session_id, limit, 0).await?;
        turns.sort_by_key(|t| t.turn_number);
        let _ = agent;
        let mut history = Vec::with_capacity(turns.len() * 2);
        for turn in turns {
            history.push(ChatMessage::user(turn.user_message));
            history.push(ChatMessage::assistant(turn.agent_response));
        }
        Ok(history)
    }

    async fn load_templates(
        &self,
        tenant_id: TenantId,
        matched_with_rules: &[(Rule, crate::rule_filter::MatchedRule)],
    ) -> Result<HashMap<TemplateId, Template>> {
        let ids: HashSet<TemplateId> = matched_with_rules.iter().filter_map(|(rule, _)| rule.template_id).collect();
        let mut templates = HashMap::with_capacity(ids.len());
        for id in ids {
            let template = self.config_store.get_template(tenant_id, id).await?;
            templates.insert(id, template);
        }
        Ok(templates)
    }

    /// Rules the enforcer must evaluate this turn: every hard-constraint
    /// rule the filter matched, plus (when configured) every enabled
    /// GLOBAL hard constraint, matched or not (§4.10
    /// `always_enforce_global`).
    async fn rules_to_enforce(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        matched_with_rules: &[(Rule, crate::rule_filter::MatchedRule)],
    ) -> Result<Vec<Rule>> {
        let mut rules: Vec<Rule> = matched_with_rules.iter().map(|(rule, _)| rule.clone()).collect();
        if self.settings.pipeline.enforcement.always_enforce_global {
            let all_rules = self.config_store.list_rules(tenant_id, agent_id).await?;
            for rule in all_rules {
                let already_present = rules.iter().any(|r| r.id == rule.id);
                if !already_present && rule.scope == RuleScope::Global && rule.enabled && !rule.header.is_deleted() && rule.is_hard_constraint {
                    rules.push(rule);
                }
            }
        }
        Ok(rules)
    }

    /// Best-effort, non-blocking ingestion of this turn into the memory
    /// store (§9 Design Notes: "consumers idempotent, dedup on episode
    /// content hash"); failures are logged rather than surfaced, since
    /// memory is read-path-optional (§4.3 falls back when empty).
    fn ingest_memory(
        &self,
        tenant_id: TenantId,
        agent_id: AgentId,
        memory_group: String,
        user_message: &str,
        agent_response: &str,
        embedding: Vec<f32>,
    ) {
        if !self.settings.memory.enabled {
            return;
        }
        let memory_store = self.memory_store.clone();
        let text = format!("{user_message}\n{agent_response}");
        let content_hash = format!("{:x}", Sha256::digest(text.as_bytes()));
        let episode = Episode {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id,
            agent_id,
            memory_group,
            text,
            embedding,
            content_hash,
            created_at: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(err) = memory_store.add_episode(episode).await {
                tracing::warn!(error = %err, "memory ingestion failed");
            }
        });
    }
}

fn scenario_pointer(session: &Session) -> ScenarioPointer {
    ScenarioPointer {
        scenario_id: session.active_scenario_id,
        step_id: session.active_step_id,
        version: session.active_scenario_version,
    }
}

fn profile_field_values(profile: &CustomerProfile) -> VarMap {
    profile.fields.iter().map(|(name, field)| (name.clone(), field.value.clone())).collect()
}

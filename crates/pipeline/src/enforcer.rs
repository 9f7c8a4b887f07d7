//! Enforcer (§4.10): two-lane post-generation validation plus the
//! regeneration/fallback remediation loop.
//!
//! Lane 1 evaluates `Rule.enforcement_expression` in the sandboxed
//! evaluator (`align_core::expr`); Lane 2 asks an LLM judge about hard
//! constraints that carry no formal expression. Both lanes only ever see
//! rules with `is_hard_constraint = true` — soft rules shape generation
//! but are never enforced.

use crate::generator::{GenerationContext, GenerationResult, ResponseGenerator};
use align_config::EnforcementConfig;
use align_core::entities::{Rule, Template};
use align_core::expr::eval_bool;
use align_core::ids::RuleId;
use align_core::providers::{ChatMessage, EmbeddingProvider, LlmProvider};
use align_core::variable::{merge_environments, VarMap, VarValue};
use align_core::vector::cosine_similarity;
use align_core::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct Violation {
    pub rule_id: RuleId,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct EnforcementOutcome {
    pub final_text: String,
    pub llm_called: bool,
    pub tokens_used: u32,
    pub violations: Vec<Violation>,
    pub fallback_used: bool,
}

pub struct Enforcer {
    llm: Arc<dyn LlmProvider>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: EnforcementConfig,
}

impl Enforcer {
    pub fn new(llm: Arc<dyn LlmProvider>, embedder: Option<Arc<dyn EmbeddingProvider>>, config: EnforcementConfig) -> Self {
        Self { llm, embedder, config }
    }

    /// Run the full remediation loop (§4.10): evaluate, and on violation
    /// regenerate up to `max_retries` times before falling back to a
    /// `FALLBACK` template (if supplied) or surfacing the violations for
    /// the caller to turn into `RULE_VIOLATION`.
    #[tracing::instrument(skip_all, fields(rules = rules_to_enforce.len()))]
    pub async fn enforce(
        &self,
        generator: &ResponseGenerator,
        message: &str,
        mut gen_ctx: GenerationContext<'_>,
        mut response: GenerationResult,
        rules_to_enforce: &[Rule],
        base_environment: &VarMap,
        query_embedding: Option<&[f32]>,
        retrieved_context: &[String],
        fallback_template: Option<&Template>,
    ) -> Result<EnforcementOutcome> {
        if !self.config.enabled {
            return Ok(EnforcementOutcome {
                final_text: response.text,
                llm_called: response.llm_called,
                tokens_used: response.tokens_used,
                violations: Vec::new(),
                fallback_used: false,
            });
        }

        let mut attempt = 0;
        loop {
            let violations = self
                .evaluate(&response.text, rules_to_enforce, base_environment, query_embedding, retrieved_context)
                .await?;

            if violations.is_empty() {
                return Ok(EnforcementOutcome {
                    final_text: response.text,
                    llm_called: response.llm_called,
                    tokens_used: response.tokens_used,
                    violations,
                    fallback_used: false,
                });
            }

            if attempt >= self.config.max_retries {
                if let Some(template) = fallback_template {
                    if let Ok(rendered) = template.render(base_environment) {
                        return Ok(EnforcementOutcome {
                            final_text: rendered,
                            llm_called: false,
                            tokens_used: 0,
                            violations,
                            fallback_used: true,
                        });
                    }
                }
                return Ok(EnforcementOutcome {
                    final_text: response.text,
                    llm_called: response.llm_called,
                    tokens_used: response.tokens_used,
                    violations,
                    fallback_used: false,
                });
            }

            gen_ctx.violation_hints = violations.iter().map(|v| format!("- {}", v.reason)).collect();
            response = generator.generate(message, &gen_ctx).await?;
            attempt += 1;
        }
    }

    /// One evaluation pass: deterministic lane, then LLM-judge lane (in
    /// deterministic rule-id order for a reproducible violation list),
    /// then the optional relevance/grounding checks.
    async fn evaluate(
        &self,
        response_text: &str,
        rules_to_enforce: &[Rule],
        base_environment: &VarMap,
        query_embedding: Option<&[f32]>,
        retrieved_context: &[String],
    ) -> Result<Vec<Violation>> {
        let mut violations = Vec::new();

        let response_vars = if self.config.deterministic_enabled {
            self.extract_response_variables(response_text, rules_to_enforce).await?
        } else {
            VarMap::new()
        };
        let environment = merge_environments([base_environment, &response_vars]);

        let mut expression_rules: Vec<&Rule> = Vec::new();
        let mut judge_rules: Vec<&Rule> = Vec::new();
        for rule in rules_to_enforce {
            if !rule.is_hard_constraint {
                continue;
            }
            match &rule.enforcement_expression {
                Some(_) if self.config.deterministic_enabled => expression_rules.push(rule),
                _ if self.config.llm_judge_enabled => judge_rules.push(rule),
                _ => {}
            }
        }

        for rule in &expression_rules {
            let expr = rule.enforcement_expression.as_deref().unwrap_or_default();
            match eval_bool(expr, &environment) {
                Ok(true) => {}
                Ok(false) => violations.push(Violation { rule_id: rule.id, reason: rule.action_text.clone() }),
                Err(e) => violations.push(Violation { rule_id: rule.id, reason: format!("expression error: {e}") }),
            }
        }

        judge_rules.sort_by_key(|r| r.id.to_string());
        for rule in judge_rules {
            if self.judge_violates(rule, response_text).await? {
                violations.push(Violation { rule_id: rule.id, reason: rule.action_text.clone() });
            }
        }

        if self.config.relevance_check.enabled {
            if let (Some(embedder), Some(query_embedding)) = (&self.embedder, query_embedding) {
                if !(self.config.relevance_check.refusal_bypass && is_refusal(response_text)) {
                    let response_embedding = embedder.embed_one(response_text, None).await?;
                    let score = cosine_similarity(query_embedding, &response_embedding);
                    if score < self.config.relevance_check.threshold {
                        violations.push(Violation {
                            rule_id: RuleId::new(),
                            reason: format!("response relevance {score:.2} below threshold"),
                        });
                    }
                }
            }
        }

        if self.config.grounding_check.enabled && !retrieved_context.is_empty() {
            if let Some(embedder) = &self.embedder {
                let response_embedding = embedder.embed_one(response_text, None).await?;
                let context_embeddings = embedder.embed(retrieved_context, None).await?;
                let best = context_embeddings
                    .iter()
                    .map(|e| cosine_similarity(&response_embedding, e))
                    .fold(f32::MIN, f32::max);
                if best < self.config.grounding_check.threshold {
                    violations.push(Violation {
                        rule_id: RuleId::new(),
                        reason: format!("response grounding {best:.2} below threshold"),
                    });
                }
            }
        }

        Ok(violations)
    }

    async fn judge_violates(&self, rule: &Rule, response_text: &str) -> Result<bool> {
        let prompt = format!("Constraint: {}\nCandidate response: {}", rule.action_text, response_text);
        let messages = vec![ChatMessage::system(JUDGE_SYSTEM_PROMPT), ChatMessage::user(prompt)];
        let response = self.llm.generate(&messages, None, 50, 0.0, None).await?;
        Ok(response.text.trim().to_uppercase().starts_with("FAIL"))
    }

    /// Deterministic extraction of numeric amounts/percentages, plus an
    /// LLM pass for named boolean flags referenced by the rules' own
    /// expressions (§4.10: "optionally LLM-extracted for complex
    /// predicates").
    async fn extract_response_variables(&self, response_text: &str, rules: &[Rule]) -> Result<VarMap> {
        let mut vars = VarMap::new();
        if let Some(cap) = AMOUNT_RE.captures(response_text) {
            if let Ok(n) = cap[1].replace(',', "").parse::<f64>() {
                vars.insert("amount".to_string(), VarValue::Number(n));
            }
        }
        if let Some(cap) = PERCENT_RE.captures(response_text) {
            if let Ok(n) = cap[1].parse::<f64>() {
                vars.insert("percentage".to_string(), VarValue::Number(n));
            }
        }

        let flags = referenced_flags(rules);
        if !flags.is_empty() {
            let prompt = format!(
                "Response: {}\nFor each name below, answer whether it holds true of the response, as a JSON object mapping name to boolean: {}",
                response_text,
                flags.join(", "),
            );
            let messages = vec![ChatMessage::system(FLAG_EXTRACTION_SYSTEM_PROMPT), ChatMessage::user(prompt)];
            let response = self.llm.generate(&messages, None, 200, 0.0, None).await?;
            if let Ok(parsed) = serde_json::from_str::<std::collections::HashMap<String, bool>>(response.text.trim()) {
                for (k, v) in parsed {
                    vars.insert(k, VarValue::Bool(v));
                }
            }
        }

        Ok(vars)
    }
}

static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\s?([0-9][0-9,]*(?:\.[0-9]+)?)").unwrap());
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s?%").unwrap());
static IDENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());

const EXPR_KEYWORDS: &[&str] = &["and", "or", "not", "in", "true", "false", "len", "abs", "min", "max", "lower"];

fn referenced_flags(rules: &[Rule]) -> Vec<String> {
    let mut flags = Vec::new();
    for rule in rules {
        let Some(expr) = &rule.enforcement_expression else { continue };
        for m in IDENT_RE.find_iter(expr) {
            let ident = m.as_str();
            if EXPR_KEYWORDS.contains(&ident) || ident.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if !flags.iter().any(|f: &String| f == ident) {
                flags.push(ident.to_string());
            }
        }
    }
    flags
}

fn is_refusal(response_text: &str) -> bool {
    let lower = response_text.to_lowercase();
    REFUSAL_PHRASES.iter().any(|p| lower.contains(p))
}

const REFUSAL_PHRASES: &[&str] = &["i don't know", "i'm not sure", "i cannot help with that", "i can't help with that"];

const JUDGE_SYSTEM_PROMPT: &str =
    "Decide whether the candidate response violates the constraint. Reply with exactly `PASS` or `FAIL: <reason>`.";
const FLAG_EXTRACTION_SYSTEM_PROMPT: &str =
    "Extract boolean flags about the response. Reply with exactly one JSON object mapping each requested name to true or false.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_regex_extracts_dollar_figure() {
        let cap = AMOUNT_RE.captures("I'll refund you $75").unwrap();
        assert_eq!(&cap[1], "75");
    }

    #[test]
    fn referenced_flags_excludes_keywords_and_numbers() {
        let rule = Rule {
            header: align_core::tenant::AgentScoped::new(align_core::ids::TenantId::new(), align_core::ids::AgentId::new()),
            id: RuleId::new(),
            condition_text: "c".into(),
            action_text: "a".into(),
            scope: align_core::entities::RuleScope::Global,
            scope_id: None,
            is_hard_constraint: true,
            enforcement_expression: Some("not contains_competitor_mention".into()),
            template_id: None,
            attached_tool_ids: vec![],
            priority: 0,
            enabled: true,
            max_fires_per_session: 0,
            cooldown_turns: 0,
            embedding: vec![],
        };
        let flags = referenced_flags(&[rule]);
        assert_eq!(flags, vec!["contains_competitor_mention".to_string()]);
    }
}

//! Response Generator (§4.8): template-mode short-circuit, prompt
//! assembly, and the LLM call itself, in streaming and non-streaming
//! variants.

use crate::context::Context;
use crate::rule_filter::MatchedRule;
use align_config::GenerationConfig;
use align_core::entities::{Rule, Template, TemplateMode};
use align_core::ids::TemplateId;
use align_core::providers::{ChatMessage, LlmProvider, TextChunk};
use align_core::tool::ToolResult;
use align_core::variable::{merge_environments, VarMap};
use align_core::Result;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub text: String,
    pub llm_called: bool,
    pub template_used: Option<TemplateId>,
    pub tokens_used: u32,
}

/// Everything the generator needs beyond the raw message; bundled so
/// `generate`/`generate_stream` take a single borrow instead of a long
/// parameter list.
pub struct GenerationContext<'a> {
    pub context: &'a Context,
    pub matched_rules: &'a [(Rule, MatchedRule)],
    pub templates: &'a HashMap<TemplateId, Template>,
    pub scenario_step_description: Option<&'a str>,
    pub memory_context: &'a [String],
    pub tool_results: &'a [ToolResult],
    pub profile_fields: &'a VarMap,
    pub session_variables: &'a VarMap,
    /// Violated-constraint hints from a prior enforcement pass (§4.10
    /// remediation loop); empty on the first generation attempt.
    pub violation_hints: Vec<String>,
}

pub struct ResponseGenerator {
    llm: Arc<dyn LlmProvider>,
    config: GenerationConfig,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, config: GenerationConfig) -> Self {
        Self { llm, config }
    }

    #[tracing::instrument(skip(self, message, gen_ctx), fields(matched_rules = gen_ctx.matched_rules.len()))]
    pub async fn generate(&self, message: &str, gen_ctx: &GenerationContext<'_>) -> Result<GenerationResult> {
        let render_values = self.render_environment(gen_ctx);

        if let Some((template_id, text)) = self.try_exclusive_template(gen_ctx, &render_values) {
            return Ok(GenerationResult { text, llm_called: false, template_used: Some(template_id), tokens_used: 0 });
        }

        let prompt = self.assemble_prompt(message, gen_ctx);
        let messages = vec![ChatMessage::system(prompt), ChatMessage::user(message.to_string())];
        let response = self
            .llm
            .generate(&messages, Some(&self.config.model), self.config.max_tokens, self.config.temperature, None)
            .await?;

        Ok(GenerationResult { text: response.text, llm_called: true, template_used: None, tokens_used: response.tokens })
    }

    /// Streaming variant (§4.8). An `EXCLUSIVE` template still short-
    /// circuits, delivered as a single `Delta` chunk followed by `Done`.
    pub async fn generate_stream(
        &self,
        message: &str,
        gen_ctx: &GenerationContext<'_>,
    ) -> Result<BoxStream<'static, Result<TextChunk>>> {
        let render_values = self.render_environment(gen_ctx);

        if let Some((_, text)) = self.try_exclusive_template(gen_ctx, &render_values) {
            let chunks = vec![Ok(TextChunk::Delta(text)), Ok(TextChunk::Done { tokens: 0 })];
            return Ok(futures::stream::iter(chunks).boxed());
        }

        let prompt = self.assemble_prompt(message, gen_ctx);
        let messages = vec![ChatMessage::system(prompt), ChatMessage::user(message.to_string())];
        self.llm
            .generate_stream(&messages, Some(&self.config.model), self.config.max_tokens, self.config.temperature, None)
            .await
    }

    fn render_environment(&self, gen_ctx: &GenerationContext<'_>) -> VarMap {
        let entity_values: VarMap = gen_ctx
            .context
            .entities
            .iter()
            .map(|e| (e.name.clone(), e.value.as_str().into()))
            .collect();
        merge_environments([gen_ctx.profile_fields, gen_ctx.session_variables, &entity_values])
    }

    fn try_exclusive_template(
        &self,
        gen_ctx: &GenerationContext<'_>,
        render_values: &VarMap,
    ) -> Option<(TemplateId, String)> {
        for (rule, _matched) in gen_ctx.matched_rules {
            let template_id = rule.template_id?;
            let template = gen_ctx.templates.get(&template_id)?;
            if template.mode == TemplateMode::Exclusive {
                if let Ok(rendered) = template.render(render_values) {
                    return Some((template_id, rendered));
                }
            }
        }
        None
    }

    fn assemble_prompt(&self, _message: &str, gen_ctx: &GenerationContext<'_>) -> String {
        let mut sections = vec![GENERATION_SYSTEM_PREAMBLE.to_string()];

        let action_bullets: Vec<String> = gen_ctx
            .matched_rules
            .iter()
            .map(|(rule, _)| format!("- {}", rule.action_text))
            .collect();
        if !action_bullets.is_empty() {
            sections.push(format!("Rules to honor:\n{}", action_bullets.join("\n")));
        }

        if let Some(description) = gen_ctx.scenario_step_description {
            sections.push(format!("Current conversation step: {description}"));
        }

        if !gen_ctx.memory_context.is_empty() {
            sections.push(format!("Relevant history:\n{}", gen_ctx.memory_context.join("\n")));
        }

        if !gen_ctx.tool_results.is_empty() {
            let tool_summary: Vec<String> = gen_ctx
                .tool_results
                .iter()
                .filter(|r| r.success)
                .map(|r| format!("- tool {} -> {:?}", r.tool_id, r.output))
                .collect();
            if !tool_summary.is_empty() {
                sections.push(format!("Tool results:\n{}", tool_summary.join("\n")));
            }
        }

        let suggest_templates: Vec<&str> = gen_ctx
            .matched_rules
            .iter()
            .filter_map(|(rule, _)| rule.template_id)
            .filter_map(|id| gen_ctx.templates.get(&id))
            .filter(|t| t.mode == TemplateMode::Suggest)
            .map(|t| t.text.as_str())
            .collect();
        if !suggest_templates.is_empty() {
            sections.push(format!("Suggested phrasing:\n{}", suggest_templates.join("\n")));
        }

        if !gen_ctx.session_variables.is_empty() {
            let vars: Vec<String> = gen_ctx.session_variables.iter().map(|(k, v)| format!("{k}={v}")).collect();
            sections.push(format!("Known variables: {}", vars.join(", ")));
        }

        if !gen_ctx.violation_hints.is_empty() {
            sections.push(format!(
                "Your previous reply violated these constraints; fix them:\n{}",
                gen_ctx.violation_hints.join("\n")
            ));
        }

        sections.join("\n\n")
    }
}

const GENERATION_SYSTEM_PREAMBLE: &str =
    "You are a customer-facing assistant. Respond naturally to the user's message while honoring every rule listed below.";

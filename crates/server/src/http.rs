//! HTTP endpoints: submitting a turn, plus health/readiness/metrics.

use crate::error::ApiError;
use crate::state::AppState;
use align_core::ids::{AgentId, TenantId};
use align_pipeline::AlignmentRequest;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/tenants/:tenant_id/agents/:agent_id/turns", post(submit_turn))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(crate::metrics::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct SubmitTurnRequest {
    channel: String,
    user_channel_id: String,
    message: String,
    #[serde(default)]
    idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct ToolCallDto {
    tool_id: String,
    success: bool,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct ViolationDto {
    rule_id: String,
    reason: String,
}

#[derive(Debug, Serialize)]
struct StageTimingDto {
    stage: String,
    duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct SubmitTurnResponse {
    session_id: String,
    turn_id: String,
    response_text: String,
    matched_rule_ids: Vec<String>,
    tool_calls: Vec<ToolCallDto>,
    violations: Vec<ViolationDto>,
    stage_timings: Vec<StageTimingDto>,
}

async fn submit_turn(
    State(state): State<AppState>,
    Path((tenant_id, agent_id)): Path<(TenantId, AgentId)>,
    Json(body): Json<SubmitTurnRequest>,
) -> Result<Json<SubmitTurnResponse>, ApiError> {
    let request = AlignmentRequest {
        tenant_id,
        agent_id,
        channel: body.channel,
        user_channel_id: body.user_channel_id,
        message: body.message,
        idempotency_key: body.idempotency_key,
    };

    let result = state.engine.orchestrator.align(request).await?;

    Ok(Json(SubmitTurnResponse {
        session_id: result.session_id.to_string(),
        turn_id: result.turn_id.to_string(),
        response_text: result.response_text,
        matched_rule_ids: result.matched_rule_ids.iter().map(|id| id.to_string()).collect(),
        tool_calls: result.tool_calls.into_iter().map(|t| ToolCallDto { tool_id: t.tool_id.to_string(), success: t.success, error: t.error }).collect(),
        violations: result.violations.into_iter().map(|v| ViolationDto { rule_id: v.rule_id.to_string(), reason: v.reason }).collect(),
        stage_timings: result.stage_timings.into_iter().map(|s| StageTimingDto { stage: s.stage, duration_ms: s.duration_ms }).collect(),
    }))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Distinct from `/health`: a production load balancer would wire this
/// to dependency checks (store/provider reachability); this reference
/// binary has nothing further to probe since its stores are in-memory.
async fn readiness_check() -> StatusCode {
    StatusCode::OK
}

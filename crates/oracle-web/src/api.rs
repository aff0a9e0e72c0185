//! HTTP route handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use oracle_core::{OracleError, UpstreamResult};

use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

/// Minimal liveness answer.
pub async fn root() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Oracle is running",
    }))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Response payload for the `/health` endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub upstream_configured: bool,
    pub tracked_users: usize,
    pub uptime_seconds: u64,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        upstream_configured: state.mediator.upstream_configured(),
        tracked_users: state.mediator.tracked_users().await,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    })
}

// ---------------------------------------------------------------------------
// GET /ping-upstream
// ---------------------------------------------------------------------------

/// Probe the upstream provider once and report what came back.
///
/// Answers 200 with the outcome in the payload, or 429 when a probe already
/// ran inside the current cooldown window.
pub async fn ping_upstream(State(state): State<Arc<AppState>>) -> Response {
    let result = match state.mediator.probe_at(chrono::Utc::now()).await {
        Ok(result) => result,
        Err(OracleError::CooldownActive { remaining_seconds }) => {
            return (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, remaining_seconds.to_string())],
                Json(json!({
                    "status": "error",
                    "kind": "cooldown",
                    "remaining_seconds": remaining_seconds,
                })),
            )
                .into_response();
        }
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": e.to_string() })),
            )
                .into_response();
        }
    };
    let kind = result.kind();

    match result {
        UpstreamResult::Success { text } => Json(json!({
            "status": "success",
            "answer": text,
        }))
        .into_response(),
        other => {
            let message = other
                .into_result()
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default();
            tracing::warn!(kind, message = %message, "upstream probe failed");
            Json(json!({
                "status": "error",
                "kind": kind,
                "message": message,
            }))
            .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// POST /api/ask
// ---------------------------------------------------------------------------

/// Request body for `/api/ask`.
#[derive(Debug, Deserialize)]
pub struct AskBody {
    pub user_id: String,
    pub question: String,
}

/// Answer a question through the mediator.
///
/// A request inside the caller's cooldown gets `429 Too Many Requests`
/// with a `Retry-After` header.
pub async fn ask(State(state): State<Arc<AppState>>, Json(body): Json<AskBody>) -> Response {
    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "user_id must not be empty" })),
        )
            .into_response();
    }

    let answer = state
        .mediator
        .answer(user_id, &body.question, chrono::Utc::now())
        .await;
    let payload = json!(answer);

    match answer.into_result() {
        Ok(_) => (StatusCode::OK, Json(payload)).into_response(),
        Err(e) => {
            let remaining = payload["remaining_seconds"].as_u64().unwrap_or(0);
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, remaining.to_string())],
                Json(json!({
                    "blocked": true,
                    "remaining_seconds": remaining,
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

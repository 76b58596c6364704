//! Axum handlers for `/api/*` routes.
//!
//! Each handler receives [`AxumState`] via [`axum::extract::State`].  Every
//! call into the orchestrator is wrapped in a timeout so a stuck request
//! answers 504 instead of holding the connection.

use std::time::Duration;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::AxumState;

/// Bound on a manual health refresh; probes run concurrently.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

// ── Request types ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct QueryRequest {
    query: String,
    #[serde(default)]
    session_id: Option<String>,
    /// Ask this agent directly (resolved by name) instead of routing.
    #[serde(default)]
    agent: Option<String>,
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Build a JSON error response body.
fn json_error(code: &str, msg: impl std::fmt::Display) -> Json<serde_json::Value> {
    Json(json!({ "error": code, "message": format!("{msg}") }))
}

// ── Handlers ──────────────────────────────────────────────────────────────────

/// POST /api/query
pub(super) async fn query(State(state): State<AxumState>, Json(req): Json<QueryRequest>) -> Response {
    let text = req.query.trim().to_string();
    if text.is_empty() {
        return (StatusCode::BAD_REQUEST, json_error("bad_request", "query must not be empty")).into_response();
    }
    let session_id = req.session_id.filter(|s| !s.trim().is_empty());
    let agent = req.agent.filter(|a| !a.trim().is_empty());

    match tokio::time::timeout(
        state.comms.reply_timeout(),
        state.comms.handle_query(&state.channel_id, text, session_id, agent.as_deref()),
    )
    .await
    {
        Ok(output) => (StatusCode::OK, Json(output)).into_response(),
        Err(_) => {
            warn!(channel_id = %state.channel_id, "query timed out");
            (StatusCode::GATEWAY_TIMEOUT, json_error("timeout", "query timed out")).into_response()
        }
    }
}

/// GET /api/health
pub(super) async fn health(State(state): State<AxumState>) -> Response {
    (StatusCode::OK, Json(state.comms.health().await)).into_response()
}

/// POST /api/health/refresh: probes every agent, then returns the same body
/// as `GET /api/health`.
pub(super) async fn health_refresh(State(state): State<AxumState>) -> Response {
    match tokio::time::timeout(REFRESH_TIMEOUT, state.comms.refresh_health()).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(_) => {
            warn!(channel_id = %state.channel_id, "health refresh timed out");
            (StatusCode::GATEWAY_TIMEOUT, json_error("timeout", "health refresh timed out")).into_response()
        }
    }
}

/// GET /api/agents
pub(super) async fn agents(State(state): State<AxumState>) -> Response {
    (StatusCode::OK, Json(state.comms.agents().await)).into_response()
}

//! Axum-based HTTP channel: JSON API for the orchestrator.
//!
//! Implements [`Component`] so it slots into the comms lifecycle: `run()`
//! drives the axum event loop and the shared [`CancellationToken`] is wired
//! to axum's graceful shutdown.
//!
//! ## URL layout
//!
//! ```text
//! POST /api/query            {query, session_id?, agent?} → FinalOutput
//! GET  /api/health           orchestrator + per-agent health
//! POST /api/health/refresh   probe every agent, then report
//! GET  /api/agents           registry snapshot
//! GET  /favicon.ico          → 204
//! ```

mod api;

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::AppError;
use crate::subsystems::runtime::{Component, ComponentFuture};

use super::state::CommsState;

// ── Shared request state ──────────────────────────────────────────────────────

/// Axum router state injected into every handler via [`axum::extract::State`].
///
/// Cheap to clone: all fields are reference-counted.
#[derive(Clone)]
pub(crate) struct AxumState {
    /// Channel identifier used in log spans.
    pub channel_id: Arc<str>,
    pub comms: Arc<CommsState>,
}

// ── AxumChannel ───────────────────────────────────────────────────────────────

pub struct AxumChannel {
    channel_id: String,
    bind_addr: String,
    state: Arc<CommsState>,
}

impl AxumChannel {
    pub fn new(channel_id: impl Into<String>, bind_addr: impl Into<String>, state: Arc<CommsState>) -> Self {
        Self {
            channel_id: channel_id.into(),
            bind_addr: bind_addr.into(),
            state,
        }
    }
}

impl Component for AxumChannel {
    fn id(&self) -> &str {
        &self.channel_id
    }

    fn run(self: Box<Self>, shutdown: CancellationToken) -> ComponentFuture {
        Box::pin(run_axum(self.channel_id, self.bind_addr, self.state, shutdown))
    }
}

// ── Server loop ───────────────────────────────────────────────────────────────

async fn run_axum(
    channel_id: String,
    bind_addr: String,
    comms: Arc<CommsState>,
    shutdown: CancellationToken,
) -> Result<(), AppError> {
    let router = router(&channel_id, comms);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| AppError::Comms(format!("axum bind failed on {bind_addr}: {e}")))?;

    info!(%channel_id, %bind_addr, "axum channel listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Comms(format!("axum server error: {e}")))?;

    info!(%channel_id, "axum channel shut down");
    Ok(())
}

// ── Router ────────────────────────────────────────────────────────────────────

/// Build the HTTP router.  Public so tests can drive it with `oneshot`.
pub fn router(channel_id: &str, comms: Arc<CommsState>) -> Router {
    let state = AxumState { channel_id: Arc::from(channel_id), comms };
    Router::new()
        .route("/api/query",          post(api::query))
        .route("/api/health",         get(api::health))
        .route("/api/health/refresh", post(api::health_refresh))
        .route("/api/agents",         get(api::agents))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(state)
}

//! Shared state for the comms subsystem: capability boundary for channels.
//!
//! Channels receive an `Arc<CommsState>` and are restricted to the typed
//! methods below.  The orchestrator and registry are private; a channel can
//! ask a question and read health, nothing more.
//!
//! [`CommsState::report_event`] lets a running channel signal the comms
//! manager (e.g. "I shut down") without touching the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::orchestrator::{FinalOutput, Orchestrator};
use crate::query::Query;
use crate::registry::{AgentDescriptor, HealthState};

// ── Events ────────────────────────────────────────────────────────────────────

/// Events a channel sends back to the comms subsystem manager.
#[derive(Debug)]
pub enum CommsEvent {
    /// Channel has stopped (clean exit or EOF).
    ChannelShutdown { channel_id: String },
    /// A new console session or HTTP conversation was seen.
    SessionStarted { channel_id: String, session_id: String },
}

// ── Health report ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentHealth {
    pub id: String,
    pub name: String,
    pub url: String,
    pub health: HealthState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

/// Body of `GET /api/health`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    pub name: String,
    /// `ok` (no agent known down), `degraded` (some down, or none
    /// registered) or `down` (every agent unreachable).
    pub status: &'static str,
    pub agents_total: usize,
    pub agents_reachable: usize,
    pub agents: Vec<AgentHealth>,
}

impl HealthReport {
    fn from_agents(name: &str, agents: Vec<AgentDescriptor>) -> Self {
        let total = agents.len();
        let reachable = agents.iter().filter(|a| a.health == HealthState::Reachable).count();
        let unreachable = agents.iter().filter(|a| a.health == HealthState::Unreachable).count();
        let status = if total == 0 || (unreachable > 0 && unreachable < total) {
            "degraded"
        } else if unreachable == total {
            "down"
        } else {
            "ok"
        };
        Self {
            name: name.to_string(),
            status,
            agents_total: total,
            agents_reachable: reachable,
            agents: agents
                .into_iter()
                .map(|a| AgentHealth {
                    id: a.id,
                    name: a.name,
                    url: a.url,
                    health: a.health,
                    last_checked: a.last_checked,
                })
                .collect(),
        }
    }
}

// ── State ─────────────────────────────────────────────────────────────────────

/// Shared state passed as `Arc<CommsState>` to every channel task.
pub struct CommsState {
    name: String,
    orchestrator: Arc<Orchestrator>,
    event_tx: mpsc::Sender<CommsEvent>,
}

impl CommsState {
    pub fn new(name: impl Into<String>, orchestrator: Arc<Orchestrator>, event_tx: mpsc::Sender<CommsEvent>) -> Self {
        Self { name: name.into(), orchestrator, event_tx }
    }

    /// Upper bound a channel should wait for [`handle_query`](Self::handle_query):
    /// the request deadline plus room for verification and assembly.
    pub fn reply_timeout(&self) -> Duration {
        self.orchestrator.deadline() + Duration::from_secs(5)
    }

    /// Run one query through the orchestrator.  Infallible by contract.
    ///
    /// `agent` names one agent to ask directly instead of routing by keyword.
    pub async fn handle_query(
        &self,
        channel_id: &str,
        text: String,
        session_id: Option<String>,
        agent: Option<&str>,
    ) -> FinalOutput {
        let mut query = Query::new(text);
        if let Some(id) = session_id {
            query = query.with_session(id);
        }
        info!(channel_id, session_id = ?query.session_id, agent = ?agent, "query received");
        match agent {
            Some(name) => self.orchestrator.handle_addressed(query, name).await,
            None => self.orchestrator.handle(query).await,
        }
    }

    pub async fn agents(&self) -> Vec<AgentDescriptor> {
        self.orchestrator.registry().snapshot().await
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport::from_agents(&self.name, self.agents().await)
    }

    /// Probe every agent now, then report.
    pub async fn refresh_health(&self) -> HealthReport {
        self.orchestrator.registry().health_check_all().await;
        self.health().await
    }

    /// Report an event to the comms subsystem manager.
    ///
    /// Non-blocking: drops the event and logs a warning if the manager is not
    /// keeping up (channel full) or has already exited (closed).
    pub fn report_event(&self, event: CommsEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("comms event dropped: {e}");
        }
    }
}
